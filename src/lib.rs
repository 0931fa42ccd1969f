//! avsync - audio/video playback timing core
//!
//! Maps a media timeline onto wall-clock time and schedules decoded audio,
//! video, and subtitle frames for presentation on per-track threads.

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod render;
pub mod session;
pub mod source;
pub mod sync;

pub use error::{AvSyncError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
