//! CRC-32 checksum engine.
//!
//! The standard reflected-polynomial (0xEDB88320) CRC-32 used by ZIP and
//! gzip. Checksums are composable chunk-by-chunk, so streaming pipelines can
//! feed data through without buffering.

/// 256-entry lookup table for the reflected polynomial.
const CRC_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Compute the CRC-32 of `bytes`, continuing from `prior`.
///
/// Pass `0` for a fresh checksum. Feeding a stream chunk-by-chunk, each time
/// passing the previous result, yields the same value as a single call over
/// the concatenated bytes.
pub fn crc32(bytes: &[u8], prior: u32) -> u32 {
    let mut crc = prior ^ 0xFFFF_FFFF;
    for &b in bytes {
        crc = CRC_TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}
