//! Streaming archive reader.
//!
//! ZIP files are read from the end: the end-of-central-directory record is
//! found by scanning backward through the trailing window (its comment has
//! tool-controlled length), ZIP64 overrides are resolved through the locator
//! when the 32-bit fields hold sentinels, and central directory entries are
//! then decoded strictly in their declared sequence.
//!
//! Opening a read stream for an entry re-validates the local file header at
//! its declared offset before trusting the data range; a corrupted or
//! adversarial central directory must not be able to direct reads outside
//! the archive.

use std::path::Path;

use crate::io::{FdGuard, ReadAt, SharedFd, read_exact_at};

use super::cp437;
use super::crc32::crc32;
use super::error::{Result, ZipError};
use super::pipeline::{ByteCountValidator, Decompressor};
use super::records::{
    CentralFileHeader, CompressionMethod, EndOfCentralDirectory, ExtraField, FLAG_ENCRYPTED,
    FLAG_STRONG_ENCRYPTION, FLAG_UTF8_NAME, LocalFileHeader, UNICODE_PATH_EXTRA_FIELD_ID,
    ZIP64_EXTRA_FIELD_ID, Zip64EndOfCentralDirectory, Zip64EocdLocator, dos_date_parts,
    dos_time_parts, parse_extra_fields, parse_zip64_extra,
};

/// Options controlling central directory decoding.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Check that a stored entry's compressed and uncompressed sizes agree,
    /// and assert decompressed byte counts while streaming.
    pub validate_entry_sizes: bool,
    /// Keep backslashes in file names instead of normalizing them to `/`.
    pub strict_file_names: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            validate_entry_sizes: true,
            strict_file_names: false,
        }
    }
}

/// Options for [`ZipArchive::open_entry_stream_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    /// Override the decompression decision for a compressed entry; `false`
    /// reads the raw DEFLATE bytes.
    pub decompress: Option<bool>,
    /// Range start within the entry's compressed bytes (raw reads only).
    pub start: Option<u64>,
    /// Range end within the entry's compressed bytes (raw reads only).
    pub end: Option<u64>,
}

/// An entry decoded from the central directory.
#[derive(Debug, Clone)]
pub struct Entry {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    /// File name as stored, before decoding and normalization.
    pub raw_name: Vec<u8>,
    pub file_name: String,
    pub extra_fields: Vec<ExtraField>,
    pub comment: String,
}

impl Entry {
    /// Directory entries end with '/'
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_method == CompressionMethod::Deflate
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date_parts(self.last_mod_date)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time_parts(self.last_mod_time)
    }

    /// Unix permission bits from the external attributes, when present.
    pub fn unix_mode(&self) -> Option<u32> {
        let mode = self.external_attributes >> 16;
        if mode == 0 { None } else { Some(mode) }
    }
}

/// ZIP archive reader over a random-access source.
///
/// Entries are decoded lazily, one [`read_entry`](Self::read_entry) call at
/// a time; [`read_entries`](Self::read_entries) drains the directory
/// eagerly. Cloning the source hands each entry stream its own reference,
/// so a read in progress keeps the underlying descriptor open even after
/// [`close`](Self::close).
pub struct ZipArchive<R: ReadAt + Clone> {
    source: Option<R>,
    file_size: u64,
    cd_offset: u64,
    entry_count: u64,
    comment: String,
    cursor: u64,
    entries_read: u64,
    faulted: bool,
    options: ReaderOptions,
}

impl ZipArchive<FdGuard> {
    /// Open an archive file for reading.
    pub async fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let fd = SharedFd::open(path.as_ref())?;
        Self::from_reader(fd.acquire(), options).await
    }
}

impl<R: ReadAt + Clone> ZipArchive<R> {
    /// Locate the archive metadata in any random-access source.
    pub async fn from_reader(source: R, options: ReaderOptions) -> Result<Self> {
        let file_size = source.size();
        if file_size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ZipError::EocdNotFound);
        }

        // The EOCDR sits at the very end, behind a comment of up to 0xFFFF
        // bytes whose length is only recorded inside the record itself, so
        // scan the trailing window backward for the signature.
        let window = (EndOfCentralDirectory::SIZE as u64 + 0xFFFF).min(file_size);
        let window_start = file_size - window;
        let mut buffer = vec![0u8; window as usize];
        read_exact_at(&source, window_start, &mut buffer).await?;

        let mut eocdr_index = None;
        for i in (0..=buffer.len() - EndOfCentralDirectory::SIZE).rev() {
            if buffer[i..i + 4] == EndOfCentralDirectory::SIGNATURE_BYTES {
                eocdr_index = Some(i);
                break;
            }
        }
        let Some(i) = eocdr_index else {
            return Err(ZipError::EocdNotFound);
        };
        let eocdr = EndOfCentralDirectory::from_bytes(&buffer[i..])?;

        if eocdr.disk_number != 0 {
            return Err(ZipError::MultiDisk(eocdr.disk_number));
        }
        let trailing = (buffer.len() - i - EndOfCentralDirectory::SIZE) as u64;
        if eocdr.comment_len as u64 != trailing {
            return Err(ZipError::InvalidCommentLength {
                expected: trailing,
                actual: eocdr.comment_len as u64,
            });
        }
        // the EOCDR comment encoding is always CP437
        let comment = cp437::decode(&buffer[i + EndOfCentralDirectory::SIZE..]);

        let mut entry_count = eocdr.total_entries as u64;
        let mut cd_offset = eocdr.cd_offset as u64;
        if eocdr.is_zip64() {
            let eocdr_offset = window_start + i as u64;
            if eocdr_offset < Zip64EocdLocator::SIZE as u64 {
                return Err(ZipError::TruncatedRecord("zip64 end of central directory locator"));
            }
            // the locator sits immediately before the EOCDR
            let mut locator_buf = [0u8; Zip64EocdLocator::SIZE];
            read_exact_at(
                &source,
                eocdr_offset - Zip64EocdLocator::SIZE as u64,
                &mut locator_buf,
            )
            .await?;
            let locator = Zip64EocdLocator::from_bytes(&locator_buf)?;

            let mut eocd64_buf = [0u8; Zip64EndOfCentralDirectory::SIZE];
            read_exact_at(&source, locator.eocd64_offset, &mut eocd64_buf).await?;
            let eocd64 = Zip64EndOfCentralDirectory::from_bytes(&eocd64_buf)?;
            entry_count = eocd64.total_entries;
            cd_offset = eocd64.cd_offset;
        }

        Ok(Self {
            source: Some(source),
            file_size,
            cd_offset,
            entry_count,
            comment,
            cursor: cd_offset,
            entries_read: 0,
            faulted: false,
            options,
        })
    }

    /// Number of entries the archive declares.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Archive comment decoded from the EOCDR.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Total size of the underlying archive in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Decode the next central directory entry.
    ///
    /// Returns `Ok(None)` once all declared entries have been read. After a
    /// fatal decoding error, no further entries are produced.
    pub async fn read_entry(&mut self) -> Result<Option<Entry>> {
        if self.faulted {
            return Err(ZipError::ReaderFaulted);
        }
        if self.entries_read == self.entry_count {
            return Ok(None);
        }
        let source = self.source.as_ref().ok_or(ZipError::Closed)?.clone();
        match self.decode_next_entry(&source).await {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                self.faulted = true;
                Err(err)
            }
        }
    }

    /// Decode all remaining entries in declared order.
    pub async fn read_entries(&mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Release the archive's own descriptor reference.
    ///
    /// Streams already opened keep their own references and finish
    /// normally; the descriptor closes once the last of them is dropped.
    pub fn close(&mut self) {
        self.source = None;
    }

    /// Open a decompressing read stream over one entry's bytes.
    pub async fn open_entry_stream(&self, entry: &Entry) -> Result<EntryReader<R>> {
        self.open_entry_stream_with(entry, StreamOptions::default()).await
    }

    /// Open a read stream with explicit decompression/range options.
    ///
    /// Byte ranges address the compressed data and are only valid for reads
    /// that do not decompress.
    pub async fn open_entry_stream_with(
        &self,
        entry: &Entry,
        options: StreamOptions,
    ) -> Result<EntryReader<R>> {
        if options.decompress.is_some() && !entry.is_compressed() {
            return Err(ZipError::InvalidStreamOptions(
                "decompress can only be specified for compressed entries".to_string(),
            ));
        }
        let mut relative_start = 0u64;
        let mut relative_end = entry.compressed_size;
        if (options.start.is_some() || options.end.is_some())
            && entry.is_compressed()
            && options.decompress != Some(false)
        {
            return Err(ZipError::InvalidStreamOptions(
                "start/end range not allowed for compressed entry without decompress = false"
                    .to_string(),
            ));
        }
        if let Some(start) = options.start {
            if start > entry.compressed_size {
                return Err(ZipError::InvalidStreamOptions(
                    "start > entry.compressed_size".to_string(),
                ));
            }
            relative_start = start;
        }
        if let Some(end) = options.end {
            if end > entry.compressed_size || end < relative_start {
                return Err(ZipError::InvalidStreamOptions(
                    "end out of range".to_string(),
                ));
            }
            relative_end = end;
        }

        let source = self.source.as_ref().ok_or(ZipError::Closed)?.clone();
        if entry.is_encrypted() {
            return Err(ZipError::EncryptedEntry(entry.file_name.clone()));
        }

        // the central directory's offset is not trusted for the data range:
        // re-read the local header and derive the range from its own
        // variable-length fields
        let mut header_buf = [0u8; LocalFileHeader::FIXED_SIZE];
        read_exact_at(&source, entry.local_header_offset, &mut header_buf).await?;
        let local = LocalFileHeader::from_bytes(&header_buf)?;

        let data_start = entry.local_header_offset
            + LocalFileHeader::FIXED_SIZE as u64
            + local.file_name_length as u64
            + local.extra_field_length as u64;
        let data_end = data_start + entry.compressed_size;
        if entry.compressed_size != 0 && data_end > self.file_size {
            return Err(ZipError::DataOutOfBounds {
                start: data_start,
                len: entry.compressed_size,
                file_size: self.file_size,
            });
        }

        let decompress = match entry.compression_method {
            CompressionMethod::Stored => false,
            CompressionMethod::Deflate => options.decompress.unwrap_or(true),
            CompressionMethod::Unknown(method) => {
                return Err(ZipError::UnsupportedCompression(method));
            }
        };
        // nothing to pump through for an empty range
        let decompress = decompress && relative_start != relative_end;

        let validator = if decompress && self.options.validate_entry_sizes {
            Some(ByteCountValidator::new(entry.uncompressed_size))
        } else {
            None
        };

        Ok(EntryReader {
            source,
            pos: data_start + relative_start,
            end: data_start + relative_end,
            stage: Decompressor::new(decompress),
            validator,
            finished: false,
        })
    }

    async fn decode_next_entry(&mut self, source: &R) -> Result<Entry> {
        let mut fixed = [0u8; CentralFileHeader::FIXED_SIZE];
        read_exact_at(source, self.cursor, &mut fixed).await?;
        let header = CentralFileHeader::from_bytes(&fixed)?;

        if header.flags & FLAG_STRONG_ENCRYPTION != 0 {
            return Err(ZipError::StrongEncryption);
        }
        self.cursor += CentralFileHeader::FIXED_SIZE as u64;

        let name_len = header.file_name_length as usize;
        let extra_len = header.extra_field_length as usize;
        let comment_len = header.file_comment_length as usize;
        let mut variable = vec![0u8; name_len + extra_len + comment_len];
        read_exact_at(source, self.cursor, &mut variable).await?;
        self.cursor += variable.len() as u64;
        self.entries_read += 1;

        let raw_name = variable[..name_len].to_vec();
        let is_utf8 = header.flags & FLAG_UTF8_NAME != 0;
        let mut file_name = decode_text(&raw_name, is_utf8);
        let extra_fields = parse_extra_fields(&variable[name_len..name_len + extra_len])?;
        let comment = decode_text(&variable[name_len + extra_len..], is_utf8);

        let mut uncompressed_size = header.uncompressed_size as u64;
        let mut compressed_size = header.compressed_size as u64;
        let mut local_header_offset = header.local_header_offset as u64;
        let need_uncompressed = header.uncompressed_size == 0xFFFF_FFFF;
        let need_compressed = header.compressed_size == 0xFFFF_FFFF;
        let need_offset = header.local_header_offset == 0xFFFF_FFFF;
        if need_uncompressed || need_compressed || need_offset {
            let field = extra_fields
                .iter()
                .find(|field| field.id == ZIP64_EXTRA_FIELD_ID)
                .ok_or(ZipError::MissingZip64ExtraField)?;
            let values =
                parse_zip64_extra(&field.data, need_uncompressed, need_compressed, need_offset)?;
            if let Some(value) = values.uncompressed_size {
                uncompressed_size = value;
            }
            if let Some(value) = values.compressed_size {
                compressed_size = value;
            }
            if let Some(value) = values.local_header_offset {
                local_header_offset = value;
            }
        }

        // an Info-ZIP Unicode Path extra field overrides the name, but only
        // when its checksum over the raw name bytes still matches
        for field in &extra_fields {
            if field.id != UNICODE_PATH_EXTRA_FIELD_ID {
                continue;
            }
            if field.data.len() < 6 {
                // too short to be meaningful
                continue;
            }
            if field.data[0] != 1 {
                // unrecognized version
                continue;
            }
            let mut recorded = [0u8; 4];
            recorded.copy_from_slice(&field.data[1..5]);
            if crc32(&raw_name, 0) != u32::from_le_bytes(recorded) {
                // stale field from an editor that renamed the entry
                continue;
            }
            file_name = String::from_utf8_lossy(&field.data[5..]).into_owned();
            break;
        }

        if self.options.validate_entry_sizes && header.method == 0 {
            let mut expected_compressed = uncompressed_size;
            if header.flags & FLAG_ENCRYPTED != 0 {
                // traditional encryption prefixes the data with a 12-byte header
                expected_compressed += 12;
            }
            if compressed_size != expected_compressed {
                return Err(ZipError::StoredSizeMismatch {
                    compressed: compressed_size,
                    uncompressed: uncompressed_size,
                });
            }
        }

        if !self.options.strict_file_names {
            // allow backslash
            file_name = file_name.replace('\\', "/");
        }
        validate_file_name(&file_name)?;

        Ok(Entry {
            version_made_by: header.version_made_by,
            version_needed: header.version_needed,
            flags: header.flags,
            compression_method: CompressionMethod::from_u16(header.method),
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
            internal_attributes: header.internal_attributes,
            external_attributes: header.external_attributes,
            local_header_offset,
            raw_name,
            file_name,
            extra_fields,
            comment,
        })
    }
}

fn decode_text(bytes: &[u8], is_utf8: bool) -> String {
    if is_utf8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        cp437::decode(bytes)
    }
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.contains('\\') {
        return Err(ZipError::InvalidPath(format!(
            "invalid characters in file name: {file_name}"
        )));
    }
    let bytes = file_name.as_bytes();
    let has_drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if file_name.starts_with('/') || has_drive_prefix {
        return Err(ZipError::InvalidPath(format!("absolute path: {file_name}")));
    }
    if file_name.split('/').any(|segment| segment == "..") {
        return Err(ZipError::InvalidPath(format!(
            "invalid relative path: {file_name}"
        )));
    }
    Ok(())
}

/// Bounded, decompressing read stream over one entry's data.
///
/// Holds its own source reference, so the archive descriptor outlives a
/// close of the [`ZipArchive`] that produced it for as long as the stream
/// is alive.
#[derive(Debug)]
pub struct EntryReader<R: ReadAt> {
    source: R,
    pos: u64,
    end: u64,
    stage: Decompressor,
    validator: Option<ByteCountValidator>,
    finished: bool,
}

const READ_CHUNK: usize = 64 * 1024;

impl<R: ReadAt> EntryReader<R> {
    /// Pull the next decompressed chunk, or `None` at the end of the entry.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        let mut out = Vec::new();
        while out.is_empty() {
            if self.pos == self.end {
                self.stage.finish(&mut out)?;
                if let Some(validator) = &mut self.validator {
                    validator.push(out.len())?;
                    validator.finish()?;
                }
                self.finished = true;
                if out.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(out));
            }

            let want = (self.end - self.pos).min(READ_CHUNK as u64) as usize;
            let mut buf = vec![0u8; want];
            let n = self.source.read_at(self.pos, &mut buf).await?;
            if n == 0 {
                return Err(ZipError::UnexpectedEof);
            }
            self.pos += n as u64;
            self.stage.push(&buf[..n], &mut out)?;
            if let Some(validator) = &mut self.validator {
                validator.push(out.len())?;
            }
        }
        Ok(Some(out))
    }

    /// Drain the stream into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::writer::{EndOptions, EntryOptions, ZipWriter};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// In-memory random access source for exercising the reader.
    #[derive(Clone, Debug)]
    struct SliceReader(Arc<Vec<u8>>);

    #[async_trait]
    impl ReadAt for SliceReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            let data = &self.0;
            if offset >= data.len() as u64 {
                return Ok(0);
            }
            let start = offset as usize;
            let n = buf.len().min(data.len() - start);
            buf[..n].copy_from_slice(&data[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    async fn build_archive(end: EndOptions) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(
                b"first entry, deflated ".repeat(40),
                "docs/first.txt",
                EntryOptions::default(),
            )
            .unwrap();
        writer
            .add_buffer(
                b"second entry, stored".to_vec(),
                "second.bin",
                EntryOptions {
                    compress: false,
                    ..Default::default()
                },
            )
            .unwrap();
        writer
            .add_empty_directory("docs", EntryOptions::default())
            .unwrap();
        writer.finish(end).await.unwrap();
        writer.into_inner()
    }

    async fn open_slice(bytes: Vec<u8>) -> ZipArchive<SliceReader> {
        ZipArchive::from_reader(SliceReader(Arc::new(bytes)), ReaderOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_entries_in_declared_order() {
        let mut archive = open_slice(build_archive(EndOptions::default()).await).await;
        assert_eq!(archive.entry_count(), 3);
        let entries = archive.read_entries().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["docs/first.txt", "second.bin", "docs/"]);
        assert!(entries[2].is_directory());
        assert!(!entries[0].is_directory());
    }

    #[tokio::test]
    async fn test_stream_round_trip_with_crc() {
        let mut archive = open_slice(build_archive(EndOptions::default()).await).await;
        let entries = archive.read_entries().await.unwrap();

        let expected: Vec<u8> = b"first entry, deflated ".repeat(40);
        let mut stream = archive.open_entry_stream(&entries[0]).await.unwrap();
        let data = stream.read_to_end().await.unwrap();
        assert_eq!(data, expected);
        assert_eq!(crc32(&data, 0), entries[0].crc32);

        let mut stream = archive.open_entry_stream(&entries[1]).await.unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), b"second entry, stored");
    }

    #[tokio::test]
    async fn test_raw_range_read() {
        let mut archive = open_slice(build_archive(EndOptions::default()).await).await;
        let entries = archive.read_entries().await.unwrap();
        let stored = &entries[1];

        let mut stream = archive
            .open_entry_stream_with(
                stored,
                StreamOptions {
                    decompress: None,
                    start: Some(7),
                    end: Some(12),
                },
            )
            .await
            .unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), b"entry");
    }

    #[tokio::test]
    async fn test_range_rejected_for_decompressed_read() {
        let mut archive = open_slice(build_archive(EndOptions::default()).await).await;
        let entries = archive.read_entries().await.unwrap();
        let err = archive
            .open_entry_stream_with(
                &entries[0],
                StreamOptions {
                    decompress: None,
                    start: Some(0),
                    end: Some(4),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::InvalidStreamOptions(_)));
    }

    #[tokio::test]
    async fn test_archive_comment() {
        let bytes = build_archive(EndOptions {
            comment: Some("runway closed".to_string()),
            ..Default::default()
        })
        .await;
        let archive = open_slice(bytes).await;
        assert_eq!(archive.comment(), "runway closed");
    }

    #[tokio::test]
    async fn test_zip64_entries_resolve_placeholders() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_buffer(
                b"forced into zip64".to_vec(),
                "big/entry.bin",
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

        let mut archive = open_slice(writer.into_inner()).await;
        let entries = archive.read_entries().await.unwrap();
        assert_eq!(entries[0].uncompressed_size, 17);
        assert_eq!(entries[0].compressed_size, 17);
        assert_eq!(entries[0].local_header_offset, 0);

        let mut stream = archive.open_entry_stream(&entries[0]).await.unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), b"forced into zip64");
    }

    #[tokio::test]
    async fn test_corrupt_central_signature_faults_reader() {
        let mut bytes = build_archive(EndOptions::default()).await;
        let eocdr_start = bytes.len() - EndOfCentralDirectory::SIZE;
        let eocdr = EndOfCentralDirectory::from_bytes(&bytes[eocdr_start..]).unwrap();
        bytes[eocdr.cd_offset as usize] ^= 0xFF;

        let mut archive = open_slice(bytes).await;
        assert!(matches!(
            archive.read_entry().await,
            Err(ZipError::InvalidSignature { .. })
        ));
        // the reader is latched after a fatal error
        assert!(matches!(
            archive.read_entry().await,
            Err(ZipError::ReaderFaulted)
        ));
    }

    #[tokio::test]
    async fn test_strong_encryption_is_fatal() {
        let mut bytes = build_archive(EndOptions::default()).await;
        let eocdr_start = bytes.len() - EndOfCentralDirectory::SIZE;
        let eocdr = EndOfCentralDirectory::from_bytes(&bytes[eocdr_start..]).unwrap();
        // set general purpose bit 6 in the first central record
        let flags_offset = eocdr.cd_offset as usize + 8;
        bytes[flags_offset] |= 0x40;

        let mut archive = open_slice(bytes).await;
        assert!(matches!(
            archive.read_entry().await,
            Err(ZipError::StrongEncryption)
        ));
    }

    #[tokio::test]
    async fn test_local_header_revalidation() {
        let bytes = build_archive(EndOptions::default()).await;
        let mut corrupted = bytes.clone();
        // clobber the first local header signature
        corrupted[0] ^= 0xFF;

        let mut archive = open_slice(corrupted).await;
        let entries = archive.read_entries().await.unwrap();
        assert!(matches!(
            archive.open_entry_stream(&entries[0]).await,
            Err(ZipError::InvalidSignature { .. })
        ));
    }

    #[tokio::test]
    async fn test_stored_size_mismatch() {
        let mut bytes = build_archive(EndOptions::default()).await;
        let eocdr_start = bytes.len() - EndOfCentralDirectory::SIZE;
        let eocdr = EndOfCentralDirectory::from_bytes(&bytes[eocdr_start..]).unwrap();

        // walk to the second (stored) record and bump its compressed size
        let first = CentralFileHeader::from_bytes(&bytes[eocdr.cd_offset as usize..]).unwrap();
        let second_offset = eocdr.cd_offset as usize
            + CentralFileHeader::FIXED_SIZE
            + first.file_name_length as usize
            + first.extra_field_length as usize
            + first.file_comment_length as usize;
        let csize_offset = second_offset + 20;
        bytes[csize_offset] ^= 0x01;

        let mut archive = open_slice(bytes).await;
        archive.read_entry().await.unwrap();
        assert!(matches!(
            archive.read_entry().await,
            Err(ZipError::StoredSizeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_archive() {
        let bytes = build_archive(EndOptions::default()).await;
        let archive = ZipArchive::from_reader(
            SliceReader(Arc::new(bytes[..10].to_vec())),
            ReaderOptions::default(),
        )
        .await;
        assert!(matches!(archive, Err(ZipError::EocdNotFound)));
    }

    #[tokio::test]
    async fn test_close_prevents_new_streams() {
        let mut archive = open_slice(build_archive(EndOptions::default()).await).await;
        let entries = archive.read_entries().await.unwrap();
        archive.close();
        assert!(matches!(
            archive.open_entry_stream(&entries[0]).await,
            Err(ZipError::Closed)
        ));
    }
}
