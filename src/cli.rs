use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rezip")]
#[command(version)]
#[command(about = "Pack and extract ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  rezip pack backup.zip docs notes.txt    pack docs/ and notes.txt into backup.zip\n  \
  rezip extract backup.zip -d out         extract backup.zip into out/\n  \
  rezip list -v backup.zip                list contents in table format")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a ZIP archive from files and directories
    Pack {
        /// Output ZIP file
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Files or directories to pack
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<String>,

        /// Store entries without compression
        #[arg(short = 'S', long)]
        store: bool,

        /// Archive comment
        #[arg(long, value_name = "TEXT")]
        comment: Option<String>,

        /// Quiet mode
        #[arg(short = 'q', action = clap::ArgAction::Count)]
        quiet: u8,
    },

    /// Extract a ZIP archive
    Extract {
        /// ZIP file to extract
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Extract files into DIR (default: current directory)
        #[arg(short = 'd', value_name = "DIR")]
        target: Option<String>,

        /// Overwrite existing files WITHOUT prompting
        #[arg(short = 'o')]
        overwrite: bool,

        /// Only extract entries under this archive path prefix
        #[arg(long, value_name = "PREFIX")]
        source_path: Option<String>,

        /// Quiet mode
        #[arg(short = 'q', action = clap::ArgAction::Count)]
        quiet: u8,
    },

    /// List archive contents
    List {
        /// ZIP file to list
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// List verbosely in table format
        #[arg(short = 'v')]
        verbose: bool,
    },
}
