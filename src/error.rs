//! Unified error types for avsync

use thiserror::Error;

/// Main error type for avsync operations
#[derive(Error, Debug)]
pub enum AvSyncError {
    /// Output device failure reported by a renderer
    #[error("Renderer '{renderer}' device error: {message}")]
    Device { renderer: String, message: String },

    /// Frame format does not match the configured output
    #[error("Format mismatch - expected: {expected}, actual: {actual}")]
    FormatMismatch { expected: String, actual: String },

    /// Renderer thread is gone
    #[error("Renderer {0} stopped")]
    RendererStopped(u64),

    /// Session was shut down and has no renderers left
    #[error("Playback session is shut down")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Thread communication error
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// I/O failure outside the real-time path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for avsync operations
pub type Result<T> = std::result::Result<T, AvSyncError>;

impl AvSyncError {
    /// Create a device error with context
    pub fn device_error(renderer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            renderer: renderer.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by reconfiguring the output
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AvSyncError::Device { .. } | AvSyncError::FormatMismatch { .. }
        )
    }

    /// Classify the error for session error events
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            AvSyncError::Device { .. } | AvSyncError::Io(_) => SessionErrorKind::Device,
            AvSyncError::FormatMismatch { .. } | AvSyncError::InvalidConfig(_) => {
                SessionErrorKind::Format
            }
            AvSyncError::RendererStopped(_)
            | AvSyncError::NotRunning
            | AvSyncError::ChannelError(_) => SessionErrorKind::Resource,
        }
    }
}

/// Error category carried by session error events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Output device failed or disconnected
    Device,
    /// Internal resource (thread, channel) unavailable
    Resource,
    /// Data could not be presented in the configured format
    Format,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionErrorKind::Device => "device",
            SessionErrorKind::Resource => "resource",
            SessionErrorKind::Format => "format",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_is_recoverable() {
        let err = AvSyncError::device_error("audio", "disconnected");
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), SessionErrorKind::Device);
        assert_eq!(
            err.to_string(),
            "Renderer 'audio' device error: disconnected"
        );
    }

    #[test]
    fn test_channel_error_is_not_recoverable() {
        let err = AvSyncError::ChannelError("closed".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), SessionErrorKind::Resource);
    }
}
