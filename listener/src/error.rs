//! Error handling for the listener agent
//!
//! Data-quality problems in the history log are never errors: they are
//! healed in place by the history store. What remains here are the
//! conditions a caller has to decide about: unusable configuration, samples
//! that cannot be stored, sampler failures, and I/O on the log file itself.
//! Log I/O failures are the only fatal ones and exit with their own code.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for the listener agent
#[derive(Error, Debug)]
pub enum ListenerError {
    /// History log errors
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metric sampler errors
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),
}

/// Errors raised by the history store
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("sample {value:?} for channel {channel} cannot be stored: {reason}")]
    InvalidSample {
        channel: usize,
        value: String,
        reason: String,
    },

    #[error("unknown channel: {name}")]
    UnknownChannel { name: String },

    #[error("channel {channel} is too far past the end of the history log ({lines} lines, at most {limit} padding lines)")]
    ChannelOutOfRange {
        channel: usize,
        lines: usize,
        limit: usize,
    },

    #[error("failed to read history log {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write history log {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to replace history log {}: {source}", .path.display())]
    Persist { path: PathBuf, source: io::Error },
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration file permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },
}

/// Metric sampler errors
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("{sampler} sampler unavailable: {reason}")]
    Unavailable { sampler: String, reason: String },

    #[error("no disk mounted at {}", .mount_point.display())]
    DiskNotFound { mount_point: PathBuf },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ListenerError>;

/// A specialized result type for history operations
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for sampler operations
pub type SamplerResult<T> = std::result::Result<T, SamplerError>;

/// Process exit code for a failure outside the history log
pub const EXIT_FAILURE: i32 = 1;

/// Process exit code for an unusable configuration
pub const EXIT_CONFIG: i32 = 2;

/// Process exit code when the history log can no longer be read or written
pub const EXIT_LOG_UNUSABLE: i32 = 3;

impl ListenerError {
    /// Check if this error requires immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ListenerError::History(
                HistoryError::Read { .. } | HistoryError::Write { .. } | HistoryError::Persist { .. }
            )
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ListenerError::History(_) => "history",
            ListenerError::Config(_) => "config",
            ListenerError::Sampler(_) => "sampler",
        }
    }

    /// Exit code the binary reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            error if error.is_critical() => EXIT_LOG_UNUSABLE,
            ListenerError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        let sampler_error = ListenerError::Sampler(SamplerError::Unavailable {
            sampler: "cpu".to_string(),
            reason: "no cpus".to_string(),
        });
        assert_eq!(sampler_error.category(), "sampler");
        assert!(!sampler_error.is_critical());
        assert_eq!(sampler_error.exit_code(), EXIT_FAILURE);

        let write_error = ListenerError::History(HistoryError::Write {
            path: PathBuf::from("listenerLog.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        });
        assert_eq!(write_error.category(), "history");
        assert!(write_error.is_critical());
        assert_eq!(write_error.exit_code(), EXIT_LOG_UNUSABLE);

        let invalid = ListenerError::History(HistoryError::InvalidSample {
            channel: 2,
            value: "1|2".to_string(),
            reason: "contains '|'".to_string(),
        });
        assert!(!invalid.is_critical());
        assert_eq!(invalid.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_error_conversion() {
        let listener_error: ListenerError = ConfigError::ValidationFailed {
            reason: "bad".to_string(),
        }
        .into();
        assert!(matches!(listener_error, ListenerError::Config(_)));
        assert_eq!(listener_error.category(), "config");
        assert_eq!(listener_error.exit_code(), EXIT_CONFIG);
    }

    #[test]
    fn test_log_failures_exit_distinctly_through_anyhow() {
        let error = anyhow::Error::from(ListenerError::from(HistoryError::Persist {
            path: PathBuf::from("listenerLog.log"),
            source: io::Error::new(io::ErrorKind::Other, "rename failed"),
        }))
        .context("history log is unusable");

        let listener_error = error.downcast_ref::<ListenerError>().unwrap();
        assert_eq!(listener_error.exit_code(), EXIT_LOG_UNUSABLE);
    }

    #[test]
    fn test_history_error_names_path() {
        let error = HistoryError::Persist {
            path: PathBuf::from("/var/log/listenerLog.log"),
            source: io::Error::new(io::ErrorKind::Other, "rename failed"),
        };
        assert!(error.to_string().contains("/var/log/listenerLog.log"));
    }
}
