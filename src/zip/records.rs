//! Binary layouts for every ZIP record type.
//!
//! All multi-byte integers are little-endian. Each record starts with a
//! 4-byte magic signature that is checked before the rest of the record is
//! trusted; a mismatch is a fatal format error, not a recoverable condition.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::time::SystemTime;

use super::error::{Result, ZipError};

/// Largest buffer accepted for an in-memory entry.
pub const MAX_BUFFER_LENGTH: usize = 0x3FFF_FFFF;

/// Version needed to extract an entry with a UTF-8 name.
pub const VERSION_NEEDED_UTF8: u16 = 20;
/// Version needed to extract a ZIP64 entry.
pub const VERSION_NEEDED_ZIP64: u16 = 45;
/// 3 = unix. 63 = spec version 6.3.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 63;

/// General purpose bit 0: the entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose bit 3: CRC-32 and sizes follow the data in a descriptor.
pub const FLAG_UNKNOWN_CRC32_AND_SIZES: u16 = 1 << 3;
/// General purpose bit 6: strong encryption.
pub const FLAG_STRONG_ENCRYPTION: u16 = 1 << 6;
/// General purpose bit 11: the file name is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 1 << 11;

/// Tag of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;
/// Tag of the Info-ZIP Unicode Path extra field.
pub const UNICODE_PATH_EXTRA_FIELD_ID: u16 = 0x7075;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// DOS-encoded last-modification timestamp: 16-bit date, 16-bit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// Encode a timestamp into the 16-bit DOS date/time pair.
    ///
    /// Seconds have 2-second resolution (odd seconds are lost) and years
    /// count from 1980.
    pub fn from_system_time(t: SystemTime) -> Self {
        let dt = time::OffsetDateTime::from(t);

        let mut date = 0u16;
        date |= (dt.day() as u16) & 0x1F; // 1-31
        date |= ((dt.month() as u16) & 0xF) << 5; // 1-12
        date |= (((dt.year() - 1980) & 0x7F) as u16) << 9; // 1980-2107

        let mut time = 0u16;
        time |= (dt.second() as u16) / 2; // 0-29 (lose odd numbers)
        time |= ((dt.minute() as u16) & 0x3F) << 5; // 0-59
        time |= ((dt.hour() as u16) & 0x1F) << 11; // 0-23

        Self { date, time }
    }
}

/// Decode a DOS date into (year, month, day).
pub fn dos_date_parts(date: u16) -> (u16, u8, u8) {
    let day = (date & 0x1F) as u8;
    let month = ((date >> 5) & 0x0F) as u8;
    let year = ((date >> 9) & 0x7F) + 1980;
    (year, month, day)
}

/// Decode a DOS time into (hour, minute, second).
pub fn dos_time_parts(time: u16) -> (u8, u8, u8) {
    let second = ((time & 0x1F) * 2) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    (hour, minute, second)
}

fn check_signature(expected: u32, actual: u32) -> Result<()> {
    if actual != expected {
        return Err(ZipError::InvalidSignature { expected, actual });
    }
    Ok(())
}

/// Local File Header - 30 bytes fixed, followed by name and extra field
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIGNATURE: u32 = 0x0403_4B50;
    pub const FIXED_SIZE: usize = 30;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(ZipError::TruncatedRecord("local file header"));
        }
        let mut cursor = Cursor::new(data);
        check_signature(
            Self::SIGNATURE,
            cursor.read_u32::<LittleEndian>()?,
        )?;
        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            method: cursor.read_u16::<LittleEndian>()?,
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Serialize the fixed fields followed by the file name.
    pub fn to_bytes(&self, file_name: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::FIXED_SIZE + file_name.len());
        buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.last_mod_time.to_le_bytes());
        buf.extend_from_slice(&self.last_mod_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(file_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.extra_field_length.to_le_bytes());
        buf.extend_from_slice(file_name);
        buf
    }
}

/// Data Descriptor - trailing CRC/sizes for entries whose sizes were unknown
/// at local-header time. 16 bytes, or 24 with 64-bit sizes for ZIP64 entries.
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub const SIGNATURE: u32 = 0x0807_4B50;
    pub const SIZE: usize = 16;
    pub const ZIP64_SIZE: usize = 24;

    pub fn to_bytes(&self) -> Vec<u8> {
        if self.zip64 {
            let mut buf = Vec::with_capacity(Self::ZIP64_SIZE);
            buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
            buf.extend_from_slice(&self.crc32.to_le_bytes());
            buf.extend_from_slice(&self.compressed_size.to_le_bytes());
            buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
            buf
        } else {
            let mut buf = Vec::with_capacity(Self::SIZE);
            buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
            buf.extend_from_slice(&self.crc32.to_le_bytes());
            buf.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            buf.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
            buf
        }
    }
}

/// Central Directory File Header - 46 bytes fixed, followed by name, extra
/// field and comment. Sizes and offsets here are the raw 32-bit wire values;
/// ZIP64 resolution happens above this layer.
#[derive(Debug, Clone)]
pub struct CentralFileHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
}

impl CentralFileHeader {
    pub const SIGNATURE: u32 = 0x0201_4B50;
    pub const FIXED_SIZE: usize = 46;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(ZipError::TruncatedRecord("central directory file header"));
        }
        let mut cursor = Cursor::new(data);
        check_signature(
            Self::SIGNATURE,
            cursor.read_u32::<LittleEndian>()?,
        )?;
        Ok(Self {
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            method: cursor.read_u16::<LittleEndian>()?,
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attributes: cursor.read_u16::<LittleEndian>()?,
            external_attributes: cursor.read_u32::<LittleEndian>()?,
            local_header_offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Serialize the fixed fields followed by name, extra field and comment.
    pub fn to_bytes(&self, file_name: &[u8], extra: &[u8], comment: &[u8]) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(Self::FIXED_SIZE + file_name.len() + extra.len() + comment.len());
        buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.version_made_by.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.last_mod_time.to_le_bytes());
        buf.extend_from_slice(&self.last_mod_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(file_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.disk_number_start.to_le_bytes());
        buf.extend_from_slice(&self.internal_attributes.to_le_bytes());
        buf.extend_from_slice(&self.external_attributes.to_le_bytes());
        buf.extend_from_slice(&self.local_header_offset.to_le_bytes());
        buf.extend_from_slice(file_name);
        buf.extend_from_slice(extra);
        buf.extend_from_slice(comment);
        buf
    }
}

/// End of Central Directory Record - 22 bytes fixed plus trailing comment
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x0605_4B50;
    pub const SIGNATURE_BYTES: [u8; 4] = Self::SIGNATURE.to_le_bytes();
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::TruncatedRecord("end of central directory"));
        }
        let mut cursor = Cursor::new(data);
        check_signature(
            Self::SIGNATURE,
            cursor.read_u32::<LittleEndian>()?,
        )?;
        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Whether the 32-bit fields defer to a ZIP64 EOCD record.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == 0xFFFF || self.cd_offset == 0xFFFF_FFFF
    }

    pub fn to_bytes(&self, comment: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE + comment.len());
        buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.disk_number.to_le_bytes());
        buf.extend_from_slice(&self.disk_with_cd.to_le_bytes());
        buf.extend_from_slice(&self.disk_entries.to_le_bytes());
        buf.extend_from_slice(&self.total_entries.to_le_bytes());
        buf.extend_from_slice(&self.cd_size.to_le_bytes());
        buf.extend_from_slice(&self.cd_offset.to_le_bytes());
        buf.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        buf.extend_from_slice(comment);
        buf
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EocdLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EocdLocator {
    pub const SIGNATURE: u32 = 0x0706_4B50;
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::TruncatedRecord("zip64 end of central directory locator"));
        }
        let mut cursor = Cursor::new(data);
        check_signature(
            Self::SIGNATURE,
            cursor.read_u32::<LittleEndian>()?,
        )?;
        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.disk_with_eocd64.to_le_bytes());
        buf.extend_from_slice(&self.eocd64_offset.to_le_bytes());
        buf.extend_from_slice(&self.total_disks.to_le_bytes());
        buf
    }
}

/// ZIP64 End of Central Directory Record - 56 bytes
#[derive(Debug, Clone)]
pub struct Zip64EndOfCentralDirectory {
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x0606_4B50;
    pub const SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::TruncatedRecord("zip64 end of central directory"));
        }
        let mut cursor = Cursor::new(data);
        check_signature(
            Self::SIGNATURE,
            cursor.read_u32::<LittleEndian>()?,
        )?;
        Ok(Self {
            record_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.record_size.to_le_bytes());
        buf.extend_from_slice(&self.version_made_by.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.disk_number.to_le_bytes());
        buf.extend_from_slice(&self.disk_with_cd.to_le_bytes());
        buf.extend_from_slice(&self.disk_entries.to_le_bytes());
        buf.extend_from_slice(&self.total_entries.to_le_bytes());
        buf.extend_from_slice(&self.cd_size.to_le_bytes());
        buf.extend_from_slice(&self.cd_offset.to_le_bytes());
        buf
    }
}

/// A tagged extra-field block from a central directory entry.
#[derive(Debug, Clone)]
pub struct ExtraField {
    pub id: u16,
    pub data: Vec<u8>,
}

/// Split an extra-field buffer into its tagged blocks.
///
/// A block declaring more data than the buffer holds is a bounds error.
pub fn parse_extra_fields(buffer: &[u8]) -> Result<Vec<ExtraField>> {
    let mut fields = Vec::new();
    let mut i = 0;
    while i + 4 <= buffer.len() {
        let id = u16::from_le_bytes([buffer[i], buffer[i + 1]]);
        let data_size = u16::from_le_bytes([buffer[i + 2], buffer[i + 3]]) as usize;
        let data_start = i + 4;
        let data_end = data_start + data_size;
        if data_end > buffer.len() {
            return Err(ZipError::ExtraFieldBounds);
        }
        fields.push(ExtraField {
            id,
            data: buffer[data_start..data_end].to_vec(),
        });
        i = data_end;
    }
    Ok(fields)
}

/// Resolved 64-bit values from a ZIP64 extended information extra field.
#[derive(Debug, Clone, Copy)]
pub struct Zip64ExtraValues {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
}

/// Parse a ZIP64 extended information extra field.
///
/// Fields are only present for the 32-bit values that read 0xFFFFFFFF, in
/// fixed order: uncompressed size, compressed size, local header offset. A
/// placeholder without its 64-bit value is a format error.
pub fn parse_zip64_extra(
    data: &[u8],
    need_uncompressed: bool,
    need_compressed: bool,
    need_offset: bool,
) -> Result<Zip64ExtraValues> {
    let mut values = Zip64ExtraValues {
        uncompressed_size: None,
        compressed_size: None,
        local_header_offset: None,
    };
    let mut index = 0;
    let mut take = |what: &'static str| -> Result<u64> {
        if index + 8 > data.len() {
            return Err(ZipError::MissingZip64Field(what));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[index..index + 8]);
        index += 8;
        Ok(u64::from_le_bytes(raw))
    };
    if need_uncompressed {
        values.uncompressed_size = Some(take("uncompressed size")?);
    }
    if need_compressed {
        values.compressed_size = Some(take("compressed size")?);
    }
    if need_offset {
        values.local_header_offset = Some(take("relative header offset")?);
    }
    Ok(values)
}

/// Serialize a ZIP64 extended information extra field carrying all three
/// 64-bit values (the matching 32-bit fields hold 0xFFFFFFFF placeholders).
pub fn encode_zip64_extra(
    uncompressed_size: u64,
    compressed_size: u64,
    local_header_offset: u64,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(28);
    buf.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
    buf.extend_from_slice(&24u16.to_le_bytes());
    buf.extend_from_slice(&uncompressed_size.to_le_bytes());
    buf.extend_from_slice(&compressed_size.to_le_bytes());
    buf.extend_from_slice(&local_header_offset.to_le_bytes());
    buf
}
