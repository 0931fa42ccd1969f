//! Playback configuration file support

use crate::error::AvSyncError;
use crate::sync::RealDuration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the working directory
const LOCAL_CONFIG: &str = "avsync.toml";

/// Playback configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial playback rate (must be > 0)
    pub playback_rate: f32,

    /// Window over which soft syncs converge, in milliseconds
    pub soft_sync_fixing_time_ms: u64,

    /// Audio ring buffer capacity in milliseconds of audio
    pub ring_buffer_ms: u32,

    /// Output gain (>= 0; integer formats clamp to 1.0)
    pub volume: f32,

    /// Present one frame immediately after a seek while paused
    pub force_step_on_seek: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            soft_sync_fixing_time_ms: 4000,
            ring_buffer_ms: 500,
            volume: 1.0,
            force_step_on_seek: true,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl PlaybackConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. `avsync.toml` in the working directory
    /// 2. `<config dir>/avsync/config.toml`
    ///
    /// Falls back to defaults when neither exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// First existing config file among the default locations
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join("avsync").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.playback_rate.is_finite() && self.playback_rate > 0.0) {
            return Err(AvSyncError::InvalidConfig(format!(
                "playback_rate must be positive, got {}",
                self.playback_rate
            )));
        }

        if !(self.volume.is_finite() && self.volume >= 0.0) {
            return Err(AvSyncError::InvalidConfig(format!(
                "volume must be >= 0, got {}",
                self.volume
            )));
        }

        if self.ring_buffer_ms == 0 {
            return Err(AvSyncError::InvalidConfig(
                "ring_buffer_ms must be non-zero".to_string(),
            ));
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(AvSyncError::InvalidConfig(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn fixing_time(&self) -> RealDuration {
        RealDuration::from_millis(self.soft_sync_fixing_time_ms as i64)
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# avsync playback configuration

# Initial playback rate, must be > 0 (default: 1.0)
playback_rate = 1.0

# Time in milliseconds over which a clock correction is smoothed (default: 4000)
# 0 applies corrections immediately
soft_sync_fixing_time_ms = 4000

# Audio ring buffer capacity in milliseconds of audio (default: 500)
ring_buffer_ms = 500

# Output gain; values above 1.0 only amplify float audio (default: 1.0)
volume = 1.0

# Show a frame right after seeking while paused (default: true)
force_step_on_seek = true

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading/writing config file
    #[error("Failed to access config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Error parsing TOML
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Error serializing config
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses_to_defaults() {
        let parsed: PlaybackConfig = toml::from_str(&PlaybackConfig::sample_config()).unwrap();
        assert_eq!(parsed, PlaybackConfig::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: PlaybackConfig = toml::from_str("playback_rate = 1.5\n").unwrap();
        assert_eq!(parsed.playback_rate, 1.5);
        assert_eq!(parsed.ring_buffer_ms, 500);
        assert_eq!(parsed.fixing_time(), RealDuration::from_millis(4000));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = PlaybackConfig {
            playback_rate: 0.5,
            volume: 0.25,
            log_file: "avsync.log".to_string(),
            ..PlaybackConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(PlaybackConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = PlaybackConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("missing.toml"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "playback_rate = \"fast\"").unwrap();
        assert!(matches!(
            PlaybackConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_rate = PlaybackConfig {
            playback_rate: 0.0,
            ..PlaybackConfig::default()
        };
        assert!(bad_rate.validate().is_err());

        let bad_volume = PlaybackConfig {
            volume: -0.5,
            ..PlaybackConfig::default()
        };
        assert!(bad_volume.validate().is_err());

        let bad_level = PlaybackConfig {
            log_level: "loud".to_string(),
            ..PlaybackConfig::default()
        };
        assert!(bad_level.validate().is_err());
    }
}
