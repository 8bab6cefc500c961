//! Command-line argument parsing
//!
//! Defines the CLI of the `sevenx` tool using clap.
//!
//! # Examples
//!
//! ```no_run
//! use sevenx::Args;
//! use clap::Parser;
//!
//! // Parse from command line
//! let args = Args::parse();
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::extract::{ExtractorConfig, OutputLayout};
use crate::utils::MAX_PARALLELISM;

/// Extract 7-Zip archives into a fresh temporary directory
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  sevenx archive.7z                    Extract everything, print the temp dir
  sevenx -f .json archive.7z           Extract only entries ending in .json
  sevenx -s archive.7z                 Extract one entry at a time
  sevenx -T 2 archive.7z               Extract at most two entries at once
  sevenx --first-subdirectory a.7z     Print the archive's top-level folder
  sevenx -l -f .txt archive.7z         List the entries that would be extracted
  sevenx -x archive.7z                 Extract with the bundled 7-Zip binary")]
pub struct Args {
    /// Path to the 7z archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Only extract entries whose name ends with SUFFIX (case-insensitive)
    #[arg(short = 'f', long = "filter", value_name = "SUFFIX")]
    pub filter: Option<String>,

    /// Extract entries one at a time, in archive order
    #[arg(short = 's', long = "sequential")]
    pub sequential: bool,

    /// Maximum number of entries extracted at once (default: CPUs, at most 8)
    #[arg(short = 'T', long = "threads", value_name = "NUM")]
    pub threads: Option<usize>,

    /// Print the first subdirectory of the extraction directory instead
    #[arg(long = "first-subdirectory")]
    pub first_subdirectory: bool,

    /// Extract with the external 7-Zip binary (no filtering)
    #[arg(short = 'x', long = "external", conflicts_with_all = ["filter", "sequential", "list_only", "first_subdirectory"])]
    pub external: bool,

    /// Directory containing the 7-Zip binary for --external
    #[arg(long = "tool-dir", value_name = "DIR", requires = "external")]
    pub tool_dir: Option<PathBuf>,

    /// List entries that would be extracted, without extracting
    #[arg(short = 'l', long = "list")]
    pub list_only: bool,

    /// Quiet mode (-q quieter, -qq quietest)
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Args {
    pub fn extractor_config(&self) -> ExtractorConfig {
        let layout = if self.first_subdirectory {
            OutputLayout::FirstSubdirectory
        } else {
            OutputLayout::TempRoot
        };
        ExtractorConfig::default()
            .layout(layout)
            .max_parallelism(self.threads.unwrap_or(MAX_PARALLELISM))
    }

    /// Default `RUST_LOG` filter for the chosen quiet level.
    pub fn log_filter(&self) -> &'static str {
        match self.quiet {
            0 => "info",
            1 => "warn",
            _ => "error",
        }
    }
}
