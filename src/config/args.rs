//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// avsync - audio/video playback timing core
///
/// Plays a synthetic tone, test pattern, and subtitle track through the
/// scheduling engine and reports what each renderer presents
#[derive(Parser, Debug)]
#[command(name = "avsync")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file (default: avsync.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Play synthetic media through the renderers
    Play {
        /// Length of one loop in milliseconds
        #[arg(short, long, default_value = "3000")]
        duration_ms: u64,

        /// Playback rate (overrides the config file)
        #[arg(short, long)]
        rate: Option<f32>,

        /// Output volume (overrides the config file)
        #[arg(long)]
        volume: Option<f32>,

        /// Number of times to play the media
        #[arg(short, long, default_value = "1")]
        loops: u32,

        /// Disable the video track
        #[arg(long)]
        no_video: bool,

        /// Disable the subtitle track
        #[arg(long)]
        no_subtitles: bool,
    },

    /// Print a sample configuration file
    Config,

    /// Validate a configuration file
    CheckConfig {
        /// Path of the file to check
        path: PathBuf,
    },
}

impl Args {
    /// Get the log level based on verbose/quiet flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::Play {
            duration_ms: 3000,
            rate: None,
            volume: None,
            loops: 1,
            no_video: false,
            no_subtitles: false,
        }
    }
}
