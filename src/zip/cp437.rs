//! CP437 text codec.
//!
//! ZIP file names and comments without the UTF-8 flag use the legacy 8-bit
//! "DOS" code page 437. Printable ASCII (0x20-0x7E) is identical in CP437,
//! ASCII and UTF-8, so that range passes through untouched; everything else
//! goes through a 256-entry code page table.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::error::{Result, ZipError};

/// The 256 code points of CP437, indexed by byte value.
const CP437: &str = "\u{0}☺☻♥♦♣♠•◘○◙♂♀♪♫☼►◄↕‼¶§▬↨↑↓→←∟↔▲▼ !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~⌂ÇüéâäàåçêëèïîìÄÅÉæÆôöòûùÿÖÜ¢£¥₧ƒáíóúñÑªº¿⌐¬½¼¡«»░▒▓│┤╡╢╖╕╣║╗╝╜╛┐└┴┬├─┼╞╟╚╔╩╦╠═╬╧╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀αßΓπΣσµτΦΘΩδ∞φε∩≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{a0}";

fn forward_table() -> &'static [char; 256] {
    static TABLE: OnceLock<[char; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let chars: Vec<char> = CP437.chars().collect();
        chars
            .try_into()
            .expect("CP437 table must contain exactly 256 code points")
    })
}

fn reverse_table() -> &'static HashMap<char, u8> {
    static TABLE: OnceLock<HashMap<char, u8>> = OnceLock::new();
    TABLE.get_or_init(|| {
        forward_table()
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u8))
            .collect()
    })
}

/// Decode CP437 bytes into a string.
pub fn decode(bytes: &[u8]) -> String {
    if bytes.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
        // CP437, ASCII, and UTF-8 overlap in this range.
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let table = forward_table();
    bytes.iter().map(|&b| table[b as usize]).collect()
}

/// Encode a string into CP437 bytes.
///
/// Fails on any character the code page cannot represent; archive names and
/// comments stored without the UTF-8 flag must be representable.
pub fn encode(s: &str) -> Result<Vec<u8>> {
    if s.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Ok(s.as_bytes().to_vec());
    }

    // Slow path through the lazily-built reverse table.
    let table = reverse_table();
    s.chars()
        .map(|c| table.get(&c).copied().ok_or(ZipError::Cp437Unencodable(c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_256_entries() {
        assert_eq!(forward_table().len(), 256);
    }

    #[test]
    fn test_ascii_fast_path() {
        let encoded = encode("readme-v1.2_FINAL (copy).txt").unwrap();
        assert_eq!(encoded, b"readme-v1.2_FINAL (copy).txt");
        assert_eq!(decode(&encoded), "readme-v1.2_FINAL (copy).txt");
    }

    #[test]
    fn test_slow_path_round_trip() {
        let original = "Ça résume tout";
        let encoded = encode(original).unwrap();
        assert_eq!(decode(&encoded), original);
        // Not pass-through: these bytes are outside ASCII.
        assert_ne!(encoded, original.as_bytes());
    }

    #[test]
    fn test_box_drawing() {
        assert_eq!(decode(&[0xC9, 0xCD, 0xBB]), "╔═╗");
    }

    #[test]
    fn test_unencodable_character() {
        assert!(matches!(
            encode("snowman \u{2603}"),
            Err(ZipError::Cp437Unencodable('\u{2603}'))
        ));
    }
}
