//! Error types for the ZIP codec.

use thiserror::Error;

/// Errors that can occur while packing or extracting ZIP archives.
#[derive(Debug, Error)]
pub enum ZipError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid record magic bytes.
    #[error("invalid signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// A record was shorter than its fixed layout requires.
    #[error("truncated {0} record")]
    TruncatedRecord(&'static str),

    /// Could not find the end of central directory record.
    #[error("end of central directory record signature not found")]
    EocdNotFound,

    /// The EOCDR comment length disagrees with the trailing bytes.
    #[error("invalid comment length: expected {expected}, found {actual}")]
    InvalidCommentLength { expected: u64, actual: u64 },

    /// Multi-disk archives are not supported.
    #[error("multi-disk zip files are not supported: found disk number {0}")]
    MultiDisk(u16),

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Strong encryption (general purpose bit 6) is not supported.
    #[error("strong encryption is not supported")]
    StrongEncryption,

    /// Traditionally encrypted entries cannot be decompressed.
    #[error("entry is encrypted: {0}")]
    EncryptedEntry(String),

    /// An extra field claims more data than its buffer holds.
    #[error("extra field length exceeds extra field buffer size")]
    ExtraFieldBounds,

    /// A 0xFFFFFFFF placeholder had no matching ZIP64 extra field value.
    #[error("zip64 extended information extra field does not include {0}")]
    MissingZip64Field(&'static str),

    /// The ZIP64 extra field itself is absent although placeholders demand it.
    #[error("expected zip64 extended information extra field")]
    MissingZip64ExtraField,

    /// Entry data extends past the end of the archive.
    #[error("file data overflows file bounds: {start} + {len} > {file_size}")]
    DataOutOfBounds { start: u64, len: u64, file_size: u64 },

    /// A stored entry's sizes disagree in the central directory.
    #[error("compressed/uncompressed size mismatch for stored file: {compressed} != {uncompressed}")]
    StoredSizeMismatch { compressed: u64, uncompressed: u64 },

    /// A stream produced more bytes than declared.
    #[error("too many bytes in the stream: expected {expected}, got at least {actual}")]
    TooManyBytes { expected: u64, actual: u64 },

    /// A stream ended before producing the declared byte count.
    #[error("not enough bytes in the stream: expected {expected}, got only {actual}")]
    NotEnoughBytes { expected: u64, actual: u64 },

    /// Decompressed data does not match the recorded checksum.
    #[error("crc32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// Entry data ended before the declared compressed size.
    #[error("unexpected end of file data")]
    UnexpectedEof,

    /// Raw DEFLATE stream error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// An archive path failed validation at registration time.
    #[error("invalid archive path: {0}")]
    InvalidPath(String),

    /// A registered source path does not name a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// A Unix permission mode outside the 16-bit range.
    #[error("invalid mode: expected 0 <= {0:o} <= 0o177777")]
    InvalidMode(u32),

    /// A buffer entry exceeds the supported maximum length.
    #[error("buffer too large: {len} > {max}")]
    BufferTooLarge { len: usize, max: usize },

    /// An entry's pumped byte count disagrees with its declared size.
    #[error("file data stream has unexpected number of bytes: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Archive or file comment exceeds the 16-bit length field.
    #[error("comment is too large: {0} bytes")]
    CommentTooLarge(usize),

    /// The archive comment would make the trailing metadata ambiguous.
    #[error("comment contains end of central directory record signature")]
    CommentContainsSignature,

    /// A character outside CP437 cannot be stored in a legacy field.
    #[error("character not encodable in CP437: {0:?}")]
    Cp437Unencodable(char),

    /// Invalid read stream options for this entry.
    #[error("invalid read stream options: {0}")]
    InvalidStreamOptions(String),

    /// The archive handle was closed before the operation.
    #[error("archive is closed")]
    Closed,

    /// The reader already failed; no further entries will be produced.
    #[error("archive reader previously failed")]
    ReaderFaulted,

    /// The operation was cancelled by the caller's token.
    #[error("operation was cancelled")]
    Cancelled,
}

/// Result type for ZIP operations.
pub type Result<T> = std::result::Result<T, ZipError>;
