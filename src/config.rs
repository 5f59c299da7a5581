//! Configuration for PathSafe's pattern set and development binary.
//!
//! The library's own configuration is data-only: a [`crate::scanner::PatternConfig`]
//! loaded from compiled-in defaults plus an optional JSON overlay file. The
//! library never parses CLI arguments or environment variables itself — that
//! is the development binary's job, kept here as a thin `clap`-derived
//! layer so a host process embedding this crate is never forced to adopt
//! its argument conventions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Local, single-file driver for scan/anonymize/verify operations during
/// development and manual spot-checks. Not a supported product surface —
/// batch orchestration and report rendering are the responsibility of
/// surrounding collaborators.
#[derive(Parser, Debug, Clone)]
#[command(name = "pathsafe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Optional JSON file of additional byte/string/date/filename patterns,
    /// merged with the compiled-in defaults.
    #[arg(long, global = true, env = "PATHSAFE_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a file for PHI without modifying it.
    Scan {
        /// Path to the WSI file to scan.
        path: PathBuf,

        /// Emit the result as JSON instead of a human-readable summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Anonymize a file in place or into a copy.
    Anonymize {
        /// Path to the WSI file to anonymize.
        path: PathBuf,

        /// Write the anonymized result to this path instead of editing
        /// `path` in place.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the post-anonymize verification rescan.
        #[arg(long, default_value_t = false)]
        no_verify: bool,

        /// Skip the pre/post diagnostic-pixel integrity hash comparison.
        #[arg(long, default_value_t = false)]
        no_verify_integrity: bool,

        /// Leave the output file's atime/mtime untouched.
        #[arg(long, default_value_t = false)]
        no_reset_timestamps: bool,

        /// Report what would be cleared without writing anything.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Emit the result as JSON instead of a human-readable summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print structural information about a file (format, byte order, IFD count).
    Info {
        /// Path to the WSI file to inspect.
        path: PathBuf,
    },
}

/// Resolved configuration handed to `main.rs`: the merged pattern set plus
/// the parsed command. Kept distinct from [`Cli`] so the merge step (which
/// can fail on malformed JSON) happens once, in one place.
pub struct AppConfig {
    pub command: Command,
    pub patterns: crate::scanner::PatternConfig,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, crate::error::ScannerError> {
        let patterns = match &cli.patterns {
            Some(path) => crate::scanner::PatternConfig::from_json(path)?,
            None => crate::scanner::PatternConfig::default(),
        };
        Ok(AppConfig {
            command: cli.command,
            patterns,
        })
    }
}
