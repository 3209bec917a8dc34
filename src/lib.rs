//! # rezip
//!
//! A streaming ZIP pack/extract library with ZIP64 support.
//!
//! Archives are written and read as pipelines of chunk-wise transform
//! stages (checksum, byte counting, raw DEFLATE), so entries of any size
//! stream through without being buffered in memory. The reader shares one
//! reference-counted file descriptor between the archive handle and every
//! open entry stream.
//!
//! ## Features
//!
//! - Pack files, in-memory buffers, byte streams and empty directories
//! - Extract with CRC-32 and size verification against the central directory
//! - ZIP64 extensions, decided per entry and for the archive trailer
//! - CP437 and UTF-8 file names, Info-ZIP Unicode Path extra field
//! - Cooperative cancellation that cleans up partially written output
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use rezip::{extract, pack, CancellationToken, ExtractOptions, PackFile, PackSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     pack(
//!         Path::new("backup.zip"),
//!         vec![PackFile {
//!             archive_path: "notes.txt".to_string(),
//!             source: PackSource::Contents(b"remember the milk".to_vec()),
//!         }],
//!     )
//!     .await?;
//!
//!     let token = CancellationToken::new();
//!     extract(
//!         Path::new("backup.zip"),
//!         Path::new("restored"),
//!         ExtractOptions::default(),
//!         &token,
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod cli;
pub mod io;
pub mod zip;

pub use cancel::CancellationToken;
pub use cli::Cli;
pub use io::{FdGuard, ReadAt, SharedFd};
pub use zip::{
    CompressionMethod, EndOptions, Entry, EntryOptions, EntryReader, ExtraField, ExtractOptions,
    PackFile, PackSource, ReaderOptions, StreamOptions, ZipArchive, ZipError, ZipWriter, extract,
    pack,
};
