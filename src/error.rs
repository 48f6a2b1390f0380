//! Error types and Result aliases for linkseq

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::directive::DirectiveError;
use crate::signals::SignalError;

/// Result type alias for linkseq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for linkseq
#[derive(Debug)]
pub enum Error {
    // === Validation errors ===
    /// A single directive failed classification
    DirectiveInvalid {
        directive: String,
        source: DirectiveError,
    },

    /// A directive list failed whole-sequence validation
    SequenceValidationFailed {
        errors: Vec<String>,
    },

    /// Sequence name is not present in the library
    SequenceNotFound {
        name: String,
    },

    /// Sequence is empty (or expanded to nothing)
    EmptySequence,

    // === Recursion errors ===
    /// Expansion refused because of a cycle or the depth limit
    RecursionLimit {
        name: String,
        depth: usize,
    },

    // === Device errors ===
    /// The device link reports it is not connected
    DeviceNotConnected,

    /// Writing a command to the device failed
    DeviceWriteFailed {
        command: String,
    },

    // === Protocol errors ===
    /// No completion line arrived in time
    CommandTimeout {
        command: String,
        duration: Duration,
    },

    /// The device answered with an error keyword
    DeviceReportedError {
        command: String,
        response: String,
    },

    // === Flow errors ===
    /// Run was cancelled cooperatively
    Cancelled,

    /// `stop_if_not` saw a false flag
    StoppedByFlag {
        flag: String,
    },

    /// `else`/`endif` without a matching `if`
    ConditionalMismatch {
        directive: String,
    },

    /// Multizone directive with no active zones
    NoActiveZones,

    /// Zone id outside 1..=4, duplicated, or empty selection
    InvalidZoneSelection {
        reason: String,
    },

    /// A run task ended without producing an outcome
    RunAborted {
        reason: String,
    },

    // === Configuration errors ===
    /// Failed to load configuration file
    ConfigLoadFailed {
        path: PathBuf,
        reason: String,
    },

    /// Configuration file not found
    ConfigNotFound,

    /// Configuration validation failed
    ConfigValidationFailed {
        field: String,
        reason: String,
    },

    /// Failed to serialize configuration
    ConfigSerializationFailed {
        format: String,
        reason: String,
    },

    /// Failed to parse configuration
    ConfigParseFailed {
        format: String,
        reason: String,
    },

    /// Failed to set up the configuration file watcher
    ConfigWatchFailed {
        reason: String,
    },

    /// A `[signals]` entry could not be parsed
    SignalConfigInvalid {
        signal: String,
        source: SignalError,
    },

    // === I/O and serialization errors ===
    /// I/O errors
    Io(std::io::Error),

    /// Serialization errors
    Serde(serde_json::Error),

    /// TOML parsing errors
    Toml(toml::de::Error),

    /// Regex compilation errors
    Regex(regex::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors (for cases not yet categorized)
    Other(String),
}

impl Error {
    /// Whether this error ended a run because of cancellation rather than failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error came from the device side of the link
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotConnected
                | Error::DeviceWriteFailed { .. }
                | Error::CommandTimeout { .. }
                | Error::DeviceReportedError { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Validation errors
            Error::DirectiveInvalid { directive, source } => {
                write!(f, "Invalid directive '{}': {}", directive, source)
            }
            Error::SequenceValidationFailed { errors } => {
                write!(f, "Sequence validation failed: {}", errors.join("; "))
            }
            Error::SequenceNotFound { name } => {
                write!(f, "Sequence '{}' not found", name)
            }
            Error::EmptySequence => {
                write!(f, "sequence is empty")
            }

            // Recursion errors
            Error::RecursionLimit { name, depth } => {
                write!(
                    f,
                    "Refused to expand '{}': cycle or depth limit reached at depth {}",
                    name, depth
                )
            }

            // Device errors
            Error::DeviceNotConnected => {
                write!(f, "device not connected")
            }
            Error::DeviceWriteFailed { command } => {
                write!(f, "Failed to send command: {}", command)
            }

            // Protocol errors
            Error::CommandTimeout { command, duration } => {
                write!(f, "Timeout for command '{}' after {:?}", command, duration)
            }
            Error::DeviceReportedError { command, response } => {
                write!(f, "Error for command '{}': {}", command, response)
            }

            // Flow errors
            Error::Cancelled => {
                write!(f, "Execution interrupted")
            }
            Error::StoppedByFlag { flag } => {
                write!(f, "Выполнение остановлено: флаг {} = false", flag)
            }
            Error::ConditionalMismatch { directive } => {
                write!(f, "{} without if", directive)
            }
            Error::NoActiveZones => {
                write!(f, "No active zones for multizone command")
            }
            Error::InvalidZoneSelection { reason } => {
                write!(f, "Invalid zone selection: {}", reason)
            }
            Error::RunAborted { reason } => {
                write!(f, "Run aborted: {}", reason)
            }

            // Configuration errors
            Error::ConfigLoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path.display(), reason)
            }
            Error::ConfigNotFound => {
                write!(f, "Configuration file not found")
            }
            Error::ConfigValidationFailed { field, reason } => {
                write!(f, "Configuration validation failed for '{}': {}", field, reason)
            }
            Error::ConfigSerializationFailed { format, reason } => {
                write!(f, "Failed to serialize config as {}: {}", format, reason)
            }
            Error::ConfigParseFailed { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }
            Error::ConfigWatchFailed { reason } => {
                write!(f, "Failed to watch config: {}", reason)
            }
            Error::SignalConfigInvalid { signal, source } => {
                write!(f, "Invalid signal '{}': {}", signal, source)
            }

            // I/O and serialization errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Toml(err) => write!(f, "TOML parsing error: {}", err),
            Error::Regex(err) => write!(f, "Regex compilation error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DirectiveInvalid { source, .. } => Some(source),
            Error::SignalConfigInvalid { source, .. } => Some(source),
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Toml(err) => Some(err),
            Error::Regex(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
