//! ZIP archive packing and extraction.
//!
//! This module implements the ZIP container format as a pair of streaming
//! codecs that never hold a whole entry in memory:
//!
//! - [`writer`]: registers entries and pumps them into an output sink in
//!   strict registration order
//! - [`reader`]: locates the trailing metadata, decodes the central
//!   directory and opens bounded, decompressing per-entry read streams
//! - [`records`]: binary layouts shared by both sides
//! - [`pipeline`]: the chunk-wise transform stages (CRC watcher, byte
//!   counters, raw-DEFLATE compressor/decompressor, size assertion)
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file, each optionally
//!    followed by a data descriptor carrying sizes that were unknown when
//!    the header was written
//! 2. A Central Directory with metadata for all files
//! 3. An End of Central Directory record, preceded by ZIP64 equivalents
//!    when the 16/32-bit fields overflow
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for large archives and offsets
//! - STORED (no compression) and DEFLATE entries
//! - CP437 and UTF-8 file names, including the Info-ZIP Unicode Path
//!   extra field
//!
//! ## Limitations
//!
//! - No encryption support (encrypted entries are detected and refused)
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod cp437;
mod crc32;
mod error;
mod pipeline;
mod reader;
mod records;
mod writer;

pub use error::{Result, ZipError};
pub use reader::{Entry, EntryReader, ReaderOptions, StreamOptions, ZipArchive};
pub use records::{CompressionMethod, ExtraField};
pub use writer::{EndOptions, EntryOptions, ZipWriter};

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::cancel::CancellationToken;
use crate::io::ReadAt;
use pipeline::Crc32Watcher;

/// One file to pack: the logical archive path plus its source.
///
/// An archive path ending in `/` packs as an empty directory entry.
#[derive(Debug)]
pub struct PackFile {
    pub archive_path: String,
    pub source: PackSource,
}

/// Where a packed entry's bytes come from.
#[derive(Debug)]
pub enum PackSource {
    /// Stream from a file on disk.
    Path(PathBuf),
    /// In-memory contents.
    Contents(Vec<u8>),
}

/// Options for [`extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Replace existing files instead of failing on them.
    pub overwrite: bool,
    /// Only extract entries under this archive-path prefix, stripping the
    /// prefix from the produced paths.
    pub source_path: Option<String>,
}

/// Write a ZIP archive containing `files` to `destination`.
pub async fn pack(destination: &Path, files: Vec<PackFile>) -> Result<()> {
    let out = tokio::fs::File::create(destination).await?;
    let mut writer = ZipWriter::new(BufWriter::new(out));
    for file in files {
        if file.archive_path.ends_with('/') {
            writer.add_empty_directory(&file.archive_path, EntryOptions::default())?;
            continue;
        }
        match file.source {
            PackSource::Path(path) => {
                writer
                    .add_file(&path, &file.archive_path, EntryOptions::default())
                    .await?;
            }
            PackSource::Contents(contents) => {
                writer.add_buffer(contents, &file.archive_path, EntryOptions::default())?;
            }
        }
    }
    writer.finish(EndOptions::default()).await?;
    Ok(())
}

/// Extract every entry of the archive at `archive_path` under `target_dir`,
/// recreating directory entries.
///
/// Decompressed byte counts and CRC-32 values are verified against the
/// central directory. The cancellation token is observed at entry
/// granularity: once it fires, the in-flight stream is dropped, any
/// partially written file is removed, and the operation fails with
/// [`ZipError::Cancelled`].
pub async fn extract(
    archive_path: &Path,
    target_dir: &Path,
    options: ExtractOptions,
    token: &CancellationToken,
) -> Result<()> {
    let mut archive = ZipArchive::open(archive_path, ReaderOptions::default()).await?;
    tokio::fs::create_dir_all(target_dir).await?;

    loop {
        if token.is_cancelled() {
            archive.close();
            return Err(ZipError::Cancelled);
        }
        let Some(entry) = archive.read_entry().await? else {
            break;
        };

        let name = match &options.source_path {
            Some(prefix) => match entry.file_name.strip_prefix(prefix.as_str()) {
                Some(rest) => {
                    let rest = rest.trim_start_matches('/');
                    if rest.is_empty() {
                        continue;
                    }
                    rest.to_string()
                }
                None => continue,
            },
            None => entry.file_name.clone(),
        };

        let target = target_dir.join(&name);
        if entry.is_directory() {
            tokio::fs::create_dir_all(&target).await?;
            continue;
        }
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        extract_entry(&archive, &entry, &target, &options, token).await?;
    }

    archive.close();
    Ok(())
}

async fn extract_entry<R: ReadAt + Clone>(
    archive: &ZipArchive<R>,
    entry: &Entry,
    target: &Path,
    options: &ExtractOptions,
    token: &CancellationToken,
) -> Result<()> {
    let mut stream = archive.open_entry_stream(entry).await?;
    let mut file = if options.overwrite {
        tokio::fs::File::create(target).await?
    } else {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await?
    };

    let mut crc_watcher = Crc32Watcher::new();
    let outcome: Result<()> = async {
        while let Some(chunk) = stream.next_chunk().await? {
            if token.is_cancelled() {
                return Err(ZipError::Cancelled);
            }
            crc_watcher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        if crc_watcher.value() != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                expected: entry.crc32,
                actual: crc_watcher.value(),
            });
        }
        Ok(())
    }
    .await;

    if let Err(err) = outcome {
        drop(stream);
        drop(file);
        // no partial output may survive a failed or cancelled entry
        let _ = tokio::fs::remove_file(target).await;
        return Err(err);
    }

    #[cfg(unix)]
    if let Some(mode) = entry.unix_mode() {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(mode & 0o777)).await?;
    }
    Ok(())
}
