//! Streaming archive writer.
//!
//! Entries are registered first (`add_file`, `add_buffer`, `add_stream`,
//! `add_empty_directory`) and pumped into the output in strict registration
//! order when the archive is sealed with [`ZipWriter::finish`]. A later
//! entry's data is never interleaved with an earlier entry's.
//!
//! Entries whose CRC and sizes are known up front (buffers, empty
//! directories) write real values into the local file header and need no
//! data descriptor. File and stream entries write zero-filled size fields
//! with general purpose bit 3 set and append a data descriptor after the
//! data, using the 64-bit descriptor layout when the entry is ZIP64.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::cp437;
use super::crc32::crc32;
use super::error::{Result, ZipError};
use super::pipeline::{ByteCounter, Compressor, Crc32Watcher};
use super::records::{
    CentralFileHeader, DataDescriptor, DosDateTime, EndOfCentralDirectory, LocalFileHeader,
    MAX_BUFFER_LENGTH, VERSION_MADE_BY, VERSION_NEEDED_UTF8, VERSION_NEEDED_ZIP64,
    Zip64EndOfCentralDirectory, Zip64EocdLocator, encode_zip64_extra, FLAG_UNKNOWN_CRC32_AND_SIZES,
    FLAG_UTF8_NAME,
};

/// Per-entry options for the `add_*` operations.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Last-modified timestamp; defaults to the source file's mtime for
    /// `add_file` and to "now" otherwise.
    pub mtime: Option<SystemTime>,
    /// Unix permission mode; defaults to the source file's mode for
    /// `add_file`, else 0o100664 for files and 0o40775 for directories.
    pub mode: Option<u32>,
    /// Compress the entry with raw DEFLATE (ignored for directories).
    pub compress: bool,
    /// Emit ZIP64 structures for this entry regardless of its sizes.
    pub force_zip64: bool,
    /// Optional per-entry comment stored in the central directory.
    pub file_comment: Option<String>,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            mtime: None,
            mode: None,
            compress: true,
            force_zip64: false,
            file_comment: None,
        }
    }
}

/// Options for sealing the archive.
#[derive(Debug, Clone, Default)]
pub struct EndOptions {
    /// Archive comment, stored CP437-encoded after the EOCDR.
    pub comment: Option<String>,
    /// Pre-encoded archive comment bytes; takes precedence over `comment`.
    pub raw_comment: Option<Vec<u8>>,
    /// Emit the ZIP64 end-of-central-directory records unconditionally.
    pub force_zip64: bool,
}

impl EndOptions {
    fn comment_bytes(&self) -> Result<Vec<u8>> {
        if let Some(raw) = &self.raw_comment {
            return Ok(raw.clone());
        }
        match &self.comment {
            Some(comment) => cp437::encode(comment),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EntryState {
    WaitingForMetadata,
    ReadyToPumpFileData,
    FileDataInProgress,
    FileDataDone,
}

enum EntrySource {
    File(PathBuf),
    /// Entry bytes ready to emit (already compressed when requested).
    Buffer(Vec<u8>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    Directory,
}

struct PendingEntry {
    name: Vec<u8>,
    state: EntryState,
    source: Option<EntrySource>,
    crc_and_size_known: bool,
    crc32: u32,
    uncompressed_size: Option<u64>,
    compressed_size: u64,
    compress: bool,
    force_zip64: bool,
    file_comment: Vec<u8>,
    dos: DosDateTime,
    external_attributes: u32,
    local_header_offset: u64,
}

impl PendingEntry {
    fn new(name: String, is_directory: bool, options: &EntryOptions) -> Result<Self> {
        let file_comment = match &options.file_comment {
            Some(comment) => {
                let bytes = comment.as_bytes().to_vec();
                if bytes.len() > 0xFFFF {
                    return Err(ZipError::CommentTooLarge(bytes.len()));
                }
                bytes
            }
            None => Vec::new(),
        };

        let mut entry = Self {
            name: name.into_bytes(),
            state: EntryState::WaitingForMetadata,
            source: None,
            crc_and_size_known: is_directory,
            crc32: 0,
            uncompressed_size: None,
            compressed_size: 0,
            compress: !is_directory && options.compress,
            force_zip64: options.force_zip64,
            file_comment,
            dos: DosDateTime::from_system_time(options.mtime.unwrap_or_else(SystemTime::now)),
            external_attributes: 0,
            local_header_offset: 0,
        };
        let default_mode = if is_directory { 0o40775 } else { 0o100664 };
        entry.set_mode(options.mode.unwrap_or(default_mode))?;
        Ok(entry)
    }

    fn set_mode(&mut self, mode: u32) -> Result<()> {
        if mode & 0xFFFF != mode {
            return Err(ZipError::InvalidMode(mode));
        }
        // unix permissions live in the upper 16 bits of the external
        // attributes field
        self.external_attributes = mode << 16;
        Ok(())
    }

    fn method(&self) -> u16 {
        if self.compress { 8 } else { 0 }
    }

    fn flags(&self) -> u16 {
        let mut flags = FLAG_UTF8_NAME;
        if !self.crc_and_size_known {
            flags |= FLAG_UNKNOWN_CRC32_AND_SIZES;
        }
        flags
    }

    fn use_zip64(&self) -> bool {
        self.force_zip64
            || self.uncompressed_size.is_some_and(|n| n > 0xFFFF_FFFE)
            || self.compressed_size > 0xFFFF_FFFE
            || self.local_header_offset > 0xFFFF_FFFE
    }

    fn local_header_bytes(&self) -> Vec<u8> {
        let (crc32, compressed_size, uncompressed_size) = if self.crc_and_size_known {
            (
                self.crc32,
                self.compressed_size as u32,
                self.uncompressed_size.unwrap_or(0) as u32,
            )
        } else {
            // deferred to the data descriptor
            (0, 0, 0)
        };
        LocalFileHeader {
            version_needed: VERSION_NEEDED_UTF8,
            flags: self.flags(),
            method: self.method(),
            last_mod_time: self.dos.time,
            last_mod_date: self.dos.date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length: self.name.len() as u16,
            extra_field_length: 0,
        }
        .to_bytes(&self.name)
    }

    fn data_descriptor_bytes(&self) -> Vec<u8> {
        if self.crc_and_size_known {
            // sizes were in the local header; a descriptor would be
            // ambiguous without general purpose bit 3
            return Vec::new();
        }
        DataDescriptor {
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size.unwrap_or(0),
            zip64: self.use_zip64(),
        }
        .to_bytes()
    }

    fn central_record_bytes(&self) -> Vec<u8> {
        let uncompressed_size = self.uncompressed_size.unwrap_or(0);
        let (version_needed, csize32, usize32, offset32, extra) = if self.use_zip64() {
            (
                VERSION_NEEDED_ZIP64,
                0xFFFF_FFFF,
                0xFFFF_FFFF,
                0xFFFF_FFFF,
                encode_zip64_extra(
                    uncompressed_size,
                    self.compressed_size,
                    self.local_header_offset,
                ),
            )
        } else {
            (
                VERSION_NEEDED_UTF8,
                self.compressed_size as u32,
                uncompressed_size as u32,
                self.local_header_offset as u32,
                Vec::new(),
            )
        };
        CentralFileHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed,
            flags: self.flags(),
            method: self.method(),
            last_mod_time: self.dos.time,
            last_mod_date: self.dos.date,
            crc32: self.crc32,
            compressed_size: csize32,
            uncompressed_size: usize32,
            file_name_length: self.name.len() as u16,
            extra_field_length: extra.len() as u16,
            file_comment_length: self.file_comment.len() as u16,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: self.external_attributes,
            local_header_offset: offset32,
        }
        .to_bytes(&self.name, &extra, &self.file_comment)
    }
}

/// Validate and normalize a logical archive path.
///
/// Rejected outright: empty paths, backslashes, absolute prefixes (`/` or a
/// drive letter), and `..` segments. Directory entries get a trailing `/`
/// appended when missing; file entries must not end with one.
fn validate_archive_path(path: &str, is_directory: bool) -> Result<String> {
    if path.is_empty() {
        return Err(ZipError::InvalidPath("empty archive path".to_string()));
    }
    if path.contains('\\') {
        return Err(ZipError::InvalidPath(format!(
            "invalid characters in archive path: {path}"
        )));
    }
    let bytes = path.as_bytes();
    let has_drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if path.starts_with('/') || has_drive_prefix {
        return Err(ZipError::InvalidPath(format!("absolute path: {path}")));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(ZipError::InvalidPath(format!(
            "invalid relative path: {path}"
        )));
    }
    let looks_like_directory = path.ends_with('/');
    if is_directory {
        if looks_like_directory {
            Ok(path.to_string())
        } else {
            Ok(format!("{path}/"))
        }
    } else if looks_like_directory {
        Err(ZipError::InvalidPath(format!(
            "file path cannot end with '/': {path}"
        )))
    } else {
        Ok(path.to_string())
    }
}

/// Streaming ZIP archive writer.
///
/// Generic over the output sink so archives can be written to a file, a
/// socket, or an in-memory buffer.
pub struct ZipWriter<W> {
    out: W,
    cursor: u64,
    entries: Vec<PendingEntry>,
    ended: bool,
    cd_offset: u64,
}

impl<W: AsyncWrite + Unpin + Send> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            cursor: 0,
            entries: Vec::new(),
            ended: false,
            cd_offset: 0,
        }
    }

    /// Register a file entry backed by a path on disk.
    ///
    /// Size, mtime and mode come from the file's metadata unless overridden
    /// through `options`.
    pub async fn add_file(
        &mut self,
        source: impl AsRef<Path>,
        archive_path: &str,
        options: EntryOptions,
    ) -> Result<()> {
        self.check_open()?;
        let name = validate_archive_path(archive_path, false)?;
        let source = source.as_ref();
        let mut entry = PendingEntry::new(name, false, &options)?;

        let metadata = tokio::fs::metadata(source).await?;
        if !metadata.is_file() {
            return Err(ZipError::NotAFile(source.display().to_string()));
        }
        entry.uncompressed_size = Some(metadata.len());
        if options.mtime.is_none()
            && let Ok(modified) = metadata.modified()
        {
            entry.dos = DosDateTime::from_system_time(modified);
        }
        #[cfg(unix)]
        if options.mode.is_none() {
            use std::os::unix::fs::PermissionsExt;
            entry.set_mode(metadata.permissions().mode() & 0xFFFF)?;
        }

        entry.source = Some(EntrySource::File(source.to_path_buf()));
        entry.state = EntryState::ReadyToPumpFileData;
        self.entries.push(entry);
        Ok(())
    }

    /// Register an in-memory entry.
    ///
    /// The CRC and sizes are computed immediately (compressing up front when
    /// requested), so the entry needs no data descriptor.
    pub fn add_buffer(
        &mut self,
        buffer: Vec<u8>,
        archive_path: &str,
        options: EntryOptions,
    ) -> Result<()> {
        self.check_open()?;
        let name = validate_archive_path(archive_path, false)?;
        if buffer.len() > MAX_BUFFER_LENGTH {
            return Err(ZipError::BufferTooLarge {
                len: buffer.len(),
                max: MAX_BUFFER_LENGTH,
            });
        }
        let mut entry = PendingEntry::new(name, false, &options)?;
        entry.uncompressed_size = Some(buffer.len() as u64);
        entry.crc32 = crc32(&buffer, 0);
        entry.crc_and_size_known = true;

        let data = if entry.compress {
            let mut compressor = Compressor::new(true);
            let mut compressed = Vec::with_capacity(buffer.len() / 2);
            compressor.push(&buffer, &mut compressed)?;
            compressor.finish(&mut compressed)?;
            compressed
        } else {
            buffer
        };
        entry.compressed_size = data.len() as u64;
        entry.source = Some(EntrySource::Buffer(data));
        entry.state = EntryState::ReadyToPumpFileData;
        self.entries.push(entry);
        Ok(())
    }

    /// Register an entry backed by an opaque byte stream.
    ///
    /// When `size` is declared, a pumped byte count that disagrees with it
    /// fails the archive; when it is `None` the size is learned from the
    /// stream.
    pub fn add_stream(
        &mut self,
        reader: impl AsyncRead + Send + Unpin + 'static,
        archive_path: &str,
        size: Option<u64>,
        options: EntryOptions,
    ) -> Result<()> {
        self.check_open()?;
        let name = validate_archive_path(archive_path, false)?;
        let mut entry = PendingEntry::new(name, false, &options)?;
        entry.uncompressed_size = size;
        entry.source = Some(EntrySource::Stream(Box::new(reader)));
        entry.state = EntryState::ReadyToPumpFileData;
        self.entries.push(entry);
        Ok(())
    }

    /// Register a directory entry (a trailing `/` is appended if missing).
    pub fn add_empty_directory(&mut self, archive_path: &str, options: EntryOptions) -> Result<()> {
        self.check_open()?;
        let name = validate_archive_path(archive_path, true)?;
        let mut entry = PendingEntry::new(name, true, &options)?;
        entry.uncompressed_size = Some(0);
        entry.source = Some(EntrySource::Directory);
        entry.state = EntryState::ReadyToPumpFileData;
        self.entries.push(entry);
        Ok(())
    }

    /// Predict the sealed archive's total size without writing anything.
    ///
    /// Returns `Ok(None)` when the size is not determinable: any entry
    /// requests compression (compressed sizes cannot be predicted) or a
    /// stream entry was registered without a declared size. No estimate is
    /// ever produced in those cases.
    pub fn predicted_final_size(&self, end: &EndOptions) -> Result<Option<u64>> {
        let comment_len = end.comment_bytes()?.len() as u64;

        let mut pretend_cursor = 0u64;
        let mut cd_size = 0u64;
        for entry in &self.entries {
            // compression is too hard to predict
            if entry.compress {
                return Ok(None);
            }
            let Some(uncompressed_size) = entry.uncompressed_size else {
                return Ok(None);
            };
            let use_zip64 = entry.force_zip64
                || uncompressed_size > 0xFFFF_FFFE
                || entry.compressed_size > 0xFFFF_FFFE
                || pretend_cursor > 0xFFFF_FFFE;

            pretend_cursor += LocalFileHeader::FIXED_SIZE as u64 + entry.name.len() as u64;
            pretend_cursor += uncompressed_size;
            if !entry.crc_and_size_known {
                pretend_cursor += if use_zip64 {
                    DataDescriptor::ZIP64_SIZE as u64
                } else {
                    DataDescriptor::SIZE as u64
                };
            }

            cd_size += CentralFileHeader::FIXED_SIZE as u64
                + entry.name.len() as u64
                + entry.file_comment.len() as u64;
            if use_zip64 {
                cd_size += 28;
            }
        }

        let mut end_size = 0u64;
        if end.force_zip64
            || self.entries.len() >= 0xFFFF
            || cd_size >= 0xFFFF_FFFF
            || pretend_cursor >= 0xFFFF_FFFF
        {
            end_size +=
                Zip64EndOfCentralDirectory::SIZE as u64 + Zip64EocdLocator::SIZE as u64;
        }
        end_size += EndOfCentralDirectory::SIZE as u64 + comment_len;
        Ok(Some(pretend_cursor + cd_size + end_size))
    }

    /// Seal the archive: pump every entry, then write the central directory
    /// and the end-of-central-directory records. Returns the total number of
    /// bytes written.
    pub async fn finish(&mut self, end: EndOptions) -> Result<u64> {
        self.check_open()?;
        self.ended = true;

        let comment = end.comment_bytes()?;
        if comment.len() > 0xFFFF {
            return Err(ZipError::CommentTooLarge(comment.len()));
        }
        // gotta check for this, because the zipfile format is actually
        // ambiguous: a comment holding the signature shadows the real EOCDR
        if comment
            .windows(4)
            .any(|w| w == EndOfCentralDirectory::SIGNATURE_BYTES)
        {
            return Err(ZipError::CommentContainsSignature);
        }

        for index in 0..self.entries.len() {
            self.pump_entry(index).await?;
        }

        self.cd_offset = self.cursor;
        for index in 0..self.entries.len() {
            let record = self.entries[index].central_record_bytes();
            self.write_out(&record).await?;
        }

        let trailer = self.end_records(&comment, end.force_zip64);
        self.write_out(&trailer).await?;
        self.out.flush().await?;
        Ok(self.cursor)
    }

    /// Consume the writer, returning the output sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn check_open(&self) -> Result<()> {
        if self.ended {
            return Err(ZipError::Closed);
        }
        Ok(())
    }

    async fn pump_entry(&mut self, index: usize) -> Result<()> {
        debug_assert!(self.entries[index].state >= EntryState::ReadyToPumpFileData);

        self.entries[index].local_header_offset = self.cursor;
        let header = self.entries[index].local_header_bytes();
        self.write_out(&header).await?;

        self.entries[index].state = EntryState::FileDataInProgress;
        let source = self.entries[index].source.take();
        match source {
            Some(EntrySource::Directory) | None => {}
            Some(EntrySource::Buffer(data)) => {
                self.write_out(&data).await?;
            }
            Some(EntrySource::File(path)) => {
                let file = tokio::fs::File::open(&path).await?;
                self.pump_read_stream(index, file).await?;
            }
            Some(EntrySource::Stream(reader)) => {
                self.pump_read_stream(index, reader).await?;
            }
        }

        let descriptor = self.entries[index].data_descriptor_bytes();
        self.write_out(&descriptor).await?;
        self.entries[index].state = EntryState::FileDataDone;
        Ok(())
    }

    /// Pump one entry's bytes through the write pipeline: CRC watcher,
    /// uncompressed counter, compressor, compressed counter, output.
    async fn pump_read_stream<R: AsyncRead + Unpin>(
        &mut self,
        index: usize,
        mut reader: R,
    ) -> Result<()> {
        let mut crc_watcher = Crc32Watcher::new();
        let mut uncompressed_counter = ByteCounter::new();
        let mut compressor = Compressor::new(self.entries[index].compress);
        let mut compressed_counter = ByteCounter::new();

        let mut chunk = vec![0u8; 64 * 1024];
        let mut staged = Vec::with_capacity(64 * 1024);
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            crc_watcher.update(&chunk[..n]);
            uncompressed_counter.add(n);
            staged.clear();
            compressor.push(&chunk[..n], &mut staged)?;
            compressed_counter.add(staged.len());
            self.write_out(&staged).await?;
        }
        staged.clear();
        compressor.finish(&mut staged)?;
        compressed_counter.add(staged.len());
        self.write_out(&staged).await?;

        let entry = &mut self.entries[index];
        entry.crc32 = crc_watcher.value();
        match entry.uncompressed_size {
            None => entry.uncompressed_size = Some(uncompressed_counter.count()),
            Some(expected) if expected != uncompressed_counter.count() => {
                return Err(ZipError::SizeMismatch {
                    expected,
                    actual: uncompressed_counter.count(),
                });
            }
            Some(_) => {}
        }
        entry.compressed_size = compressed_counter.count();
        Ok(())
    }

    fn end_records(&self, comment: &[u8], force_zip64: bool) -> Vec<u8> {
        let mut need_zip64 = false;

        let mut normal_entry_count = self.entries.len() as u64;
        if force_zip64 || self.entries.len() >= 0xFFFF {
            normal_entry_count = 0xFFFF;
            need_zip64 = true;
        }
        let cd_size = self.cursor - self.cd_offset;
        let mut normal_cd_size = cd_size;
        if force_zip64 || cd_size >= 0xFFFF_FFFF {
            normal_cd_size = 0xFFFF_FFFF;
            need_zip64 = true;
        }
        let mut normal_cd_offset = self.cd_offset;
        if force_zip64 || self.cd_offset >= 0xFFFF_FFFF {
            normal_cd_offset = 0xFFFF_FFFF;
            need_zip64 = true;
        }

        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: normal_entry_count as u16,
            total_entries: normal_entry_count as u16,
            cd_size: normal_cd_size as u32,
            cd_offset: normal_cd_offset as u32,
            comment_len: comment.len() as u16,
        }
        .to_bytes(comment);

        if !need_zip64 {
            return eocdr;
        }

        let eocd64 = Zip64EndOfCentralDirectory {
            record_size: Zip64EndOfCentralDirectory::SIZE as u64 - 12,
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED_ZIP64,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: self.entries.len() as u64,
            total_entries: self.entries.len() as u64,
            cd_size,
            cd_offset: self.cd_offset,
        }
        .to_bytes();
        let locator = Zip64EocdLocator {
            disk_with_eocd64: 0,
            // the ZIP64 EOCD record lands at the current cursor
            eocd64_offset: self.cursor,
            total_disks: 1,
        }
        .to_bytes();

        let mut trailer = eocd64;
        trailer.extend_from_slice(&locator);
        trailer.extend_from_slice(&eocdr);
        trailer
    }

    async fn write_out(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.out.write_all(bytes).await?;
        self.cursor += bytes.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::records::FLAG_ENCRYPTED;

    #[test]
    fn test_path_validation_rejections() {
        for bad in [
            "",
            "a\\b.txt",
            "/etc/passwd",
            "C:evil.txt",
            "c:/evil.txt",
            "../escape.txt",
            "nested/../../escape.txt",
            "dir/..",
        ] {
            assert!(
                matches!(validate_archive_path(bad, false), Err(ZipError::InvalidPath(_))),
                "expected rejection: {bad:?}"
            );
        }
        assert!(matches!(
            validate_archive_path("file/", false),
            Err(ZipError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_path_validation_normalization() {
        assert_eq!(validate_archive_path("a/b.txt", false).unwrap(), "a/b.txt");
        assert_eq!(validate_archive_path("dir", true).unwrap(), "dir/");
        assert_eq!(validate_archive_path("dir/", true).unwrap(), "dir/");
        // `..` as a name fragment is fine, only whole segments are rejected
        assert_eq!(
            validate_archive_path("notes..txt", false).unwrap(),
            "notes..txt"
        );
    }

    #[test]
    fn test_zip64_threshold() {
        let mut entry =
            PendingEntry::new("big.bin".to_string(), false, &EntryOptions::default()).unwrap();
        entry.uncompressed_size = Some(0xFFFF_FFFE);
        assert!(!entry.use_zip64());
        entry.uncompressed_size = Some(0xFFFF_FFFF);
        assert!(entry.use_zip64());

        entry.uncompressed_size = Some(10);
        entry.force_zip64 = true;
        assert!(entry.use_zip64());
    }

    #[tokio::test]
    async fn test_buffer_archive_layout() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(
                b"stored contents".to_vec(),
                "a.txt",
                EntryOptions {
                    compress: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let total = writer.finish(EndOptions::default()).await.unwrap();
        let bytes = writer.out;
        assert_eq!(total, bytes.len() as u64);

        // local file header at offset zero
        assert_eq!(&bytes[0..4], &LocalFileHeader::SIGNATURE.to_le_bytes());
        // sizes known up front: no general purpose bit 3, no descriptor
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        assert_eq!(flags & FLAG_UNKNOWN_CRC32_AND_SIZES, 0);
        assert_eq!(flags & FLAG_ENCRYPTED, 0);
        // stored data directly follows the header + name
        let data_start = 30 + "a.txt".len();
        assert_eq!(&bytes[data_start..data_start + 15], b"stored contents");
        // EOCDR with one entry at the tail
        let eocdr_start = bytes.len() - EndOfCentralDirectory::SIZE;
        let eocdr = EndOfCentralDirectory::from_bytes(&bytes[eocdr_start..]).unwrap();
        assert_eq!(eocdr.total_entries, 1);
        assert!(!eocdr.is_zip64());
    }

    #[tokio::test]
    async fn test_file_entries_use_descriptors() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_stream(
                std::io::Cursor::new(b"streamed bytes".to_vec()),
                "s.txt",
                None,
                EntryOptions {
                    compress: false,
                    ..Default::default()
                },
            )
            .unwrap();
        writer.finish(EndOptions::default()).await.unwrap();
        let bytes = writer.out;

        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        assert_ne!(flags & FLAG_UNKNOWN_CRC32_AND_SIZES, 0);
        // zero-filled deferred fields in the local header
        assert_eq!(&bytes[14..26], &[0u8; 12]);
        // descriptor follows the data
        let descriptor_start = 30 + "s.txt".len() + "streamed bytes".len();
        assert_eq!(
            &bytes[descriptor_start..descriptor_start + 4],
            &DataDescriptor::SIGNATURE.to_le_bytes()
        );
    }

    #[tokio::test]
    async fn test_declared_stream_size_mismatch() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_stream(
                std::io::Cursor::new(b"only 14 bytes!".to_vec()),
                "s.bin",
                Some(99),
                EntryOptions::default(),
            )
            .unwrap();
        assert!(matches!(
            writer.finish(EndOptions::default()).await,
            Err(ZipError::SizeMismatch { expected: 99, actual: 14 })
        ));
    }

    #[tokio::test]
    async fn test_forced_zip64_central_record() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(
                b"tiny".to_vec(),
                "tiny.bin",
                EntryOptions {
                    compress: false,
                    force_zip64: true,
                    ..Default::default()
                },
            )
            .unwrap();
        writer
            .finish(EndOptions {
                force_zip64: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let bytes = writer.out;

        // forced archive-level ZIP64: locator and record precede the EOCDR
        let eocdr_start = bytes.len() - EndOfCentralDirectory::SIZE;
        let locator_start = eocdr_start - Zip64EocdLocator::SIZE;
        let locator = Zip64EocdLocator::from_bytes(&bytes[locator_start..]).unwrap();
        let eocd64 =
            Zip64EndOfCentralDirectory::from_bytes(&bytes[locator.eocd64_offset as usize..])
                .unwrap();
        assert_eq!(eocd64.total_entries, 1);

        // the central record carries placeholders plus the extra field
        let record =
            CentralFileHeader::from_bytes(&bytes[eocd64.cd_offset as usize..]).unwrap();
        assert_eq!(record.compressed_size, 0xFFFF_FFFF);
        assert_eq!(record.uncompressed_size, 0xFFFF_FFFF);
        assert_eq!(record.local_header_offset, 0xFFFF_FFFF);
        assert_eq!(record.extra_field_length, 28);
    }

    #[tokio::test]
    async fn test_comment_rules() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(b"x".to_vec(), "x", EntryOptions::default())
            .unwrap();
        assert!(matches!(
            writer
                .finish(EndOptions {
                    raw_comment: Some(b"see PK\x05\x06 inside".to_vec()),
                    ..Default::default()
                })
                .await,
            Err(ZipError::CommentContainsSignature)
        ));
    }

    #[tokio::test]
    async fn test_predicted_final_size() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(
                b"12345".to_vec(),
                "five.bin",
                EntryOptions {
                    compress: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let predicted = writer
            .predicted_final_size(&EndOptions::default())
            .unwrap()
            .unwrap();
        let actual = writer.finish(EndOptions::default()).await.unwrap();
        assert_eq!(predicted, actual);
    }

    #[tokio::test]
    async fn test_predicted_size_unknown_with_compression() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(b"zzz".to_vec(), "z.txt", EntryOptions::default())
            .unwrap();
        // compression makes the final size not determinable; no estimate
        assert_eq!(
            writer.predicted_final_size(&EndOptions::default()).unwrap(),
            None
        );
    }
}
