//! Main entry point for the rezip CLI application.
//!
//! This binary provides a command-line interface for creating, extracting
//! and listing ZIP archives.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};

use rezip::cli::{Cli, Command};
use rezip::zip::{
    self, EndOptions, EntryOptions, ExtractOptions, ReaderOptions, ZipArchive, ZipWriter,
};
use rezip::CancellationToken;

/// Application entry point.
///
/// Parses command-line arguments and dispatches to the pack, extract or
/// list handler.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Pack {
            archive,
            paths,
            store,
            comment,
            quiet,
        } => pack_archive(&archive, &paths, store, comment, quiet > 0).await,
        Command::Extract {
            archive,
            target,
            overwrite,
            source_path,
            quiet,
        } => extract_archive(&archive, target, overwrite, source_path, quiet > 0).await,
        Command::List { archive, verbose } => list_files(&archive, verbose).await,
    }
}

/// Pack files and directories into a new ZIP archive.
///
/// Single files are stored under their base name; directories are walked
/// recursively and their contents stored relative to the directory itself.
async fn pack_archive(
    archive: &str,
    paths: &[String],
    store: bool,
    comment: Option<String>,
    quiet: bool,
) -> Result<()> {
    let out = tokio::fs::File::create(archive)
        .await
        .with_context(|| format!("cannot create archive: {archive}"))?;
    let mut writer = ZipWriter::new(tokio::io::BufWriter::new(out));
    let options = EntryOptions {
        compress: !store,
        ..Default::default()
    };

    for path in paths {
        let path = Path::new(path);
        if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            if !quiet {
                println!("  adding: {name}");
            }
            writer.add_file(path, &name, options.clone()).await?;
        } else if path.is_dir() {
            for (local_path, name) in walk_directory(path)? {
                if !quiet {
                    println!("  adding: {name}");
                }
                writer.add_file(&local_path, &name, options.clone()).await?;
            }
        } else {
            bail!("no such file or directory: {}", path.display());
        }
    }

    let total = writer
        .finish(EndOptions {
            comment,
            ..Default::default()
        })
        .await?;
    if !quiet {
        println!("wrote {archive} ({total} bytes)");
    }
    Ok(())
}

/// Collect all files under `root`, with archive paths relative to it.
fn walk_directory(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let name = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, name));
            }
        }
    }
    // read_dir order is platform-dependent; archives should be reproducible
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Extract a ZIP archive, with pre-flight checks on the archive path.
async fn extract_archive(
    archive: &str,
    target: Option<String>,
    overwrite: bool,
    source_path: Option<String>,
    quiet: bool,
) -> Result<()> {
    let archive_path = Path::new(archive);
    if !archive_path.exists() {
        bail!("no such file: {archive}");
    }
    if !archive_path.is_file() {
        bail!("not a file: {archive}");
    }
    if archive_path.extension().and_then(|e| e.to_str()) != Some("zip") {
        bail!("unexpected file extension (expected .zip): {archive}");
    }

    let target = PathBuf::from(target.unwrap_or_else(|| ".".to_string()));

    // ctrl-c cancels the extraction and removes partial output
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    zip::extract(
        archive_path,
        &target,
        ExtractOptions {
            overwrite,
            source_path,
        },
        &token,
    )
    .await?;

    if !quiet {
        println!("extracted {archive} into {}", target.display());
    }
    Ok(())
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format: just file names, one per line
/// - Verbose format (`-v`): detailed table with size, compression ratio,
///   and timestamps
async fn list_files(archive: &str, verbose: bool) -> Result<()> {
    let mut archive = ZipArchive::open(Path::new(archive), ReaderOptions::default()).await?;
    let entries = archive.read_entries().await?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();

            // Compression ratio as percentage saved
            let ratio = if entry.uncompressed_size > 0 {
                format!(
                    "{:>4}%",
                    100 - (entry.compressed_size * 100 / entry.uncompressed_size)
                )
            } else {
                "  0%".to_string()
            };

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio,
                year,
                month,
                day,
                hour,
                minute,
                entry.file_name
            );

            if !entry.is_directory() {
                total_uncompressed += entry.uncompressed_size;
                total_compressed += entry.compressed_size;
                file_count += 1;
            }
        } else {
            println!("{}", entry.file_name);
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = if total_uncompressed > 0 {
            format!(
                "{:>4}%",
                100 - (total_compressed * 100 / total_uncompressed)
            )
        } else {
            "  0%".to_string()
        };
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
        if !archive.comment().is_empty() {
            println!("archive comment: {}", archive.comment());
        }
    }

    Ok(())
}
