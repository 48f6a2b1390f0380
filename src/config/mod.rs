//! Configuration management for linkseq
//!
//! A single typed [`Config`] is assembled once at load time from TOML (or JSON).
//! Every section has defaults, so a file only needs the parts it changes:
//!
//! ```toml
//! [sequences]
//! prime = ["home", "wait 0.5", "og_multizone-fill"]
//!
//! [buttons]
//! home = "G28"
//!
//! [flags]
//! nozzle_ready = true
//!
//! [signals]
//! DOOR = "door_closed (bool)"
//!
//! [sequence_keywords]
//! complete_line = ["complete"]
//! error = ["err", "error", "fail"]
//! ```

pub mod loader;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::directive::{DirectiveClassifier, DEFAULT_MAX_DIRECTIVE_LENGTH, DEFAULT_MAX_WAIT_TIME};
use crate::executor::protocol::SequenceKeywords;
use crate::recursion::DEFAULT_MAX_RECURSION_DEPTH;

/// Main configuration structure for linkseq
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sequence name to raw directive list
    pub sequences: HashMap<String, Vec<String>>,

    /// Button name to raw device command
    pub buttons: HashMap<String, String>,

    /// Initial flag values; non-boolean entries are ignored on import
    pub flags: HashMap<String, toml::Value>,

    /// Device signal name to `variable (type)` mapping
    pub signals: HashMap<String, String>,

    /// Response keyword sets
    pub sequence_keywords: SequenceKeywords,

    /// Expansion and validation limits
    pub limits: LimitsConfig,

    /// Executor timing and link settings
    pub execution: ExecutionConfig,

    /// Initial zone selection
    pub zones: ZonesConfig,
}

/// Expansion and validation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum nesting depth of sequences
    pub max_recursion_depth: usize,

    /// Maximum `wait` duration in seconds
    pub max_wait_time: f64,

    /// Maximum length of a single directive in characters
    pub max_directive_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_wait_time: DEFAULT_MAX_WAIT_TIME,
            max_directive_length: DEFAULT_MAX_DIRECTIVE_LENGTH,
        }
    }
}

impl LimitsConfig {
    /// Classifier honouring these limits
    pub fn classifier(&self) -> DirectiveClassifier {
        DirectiveClassifier::new(self.max_wait_time, self.max_directive_length)
    }
}

/// Executor timing and link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Time allowed for a command to complete
    pub command_timeout_ms: u64,

    /// Time allowed for a zone select command to complete
    pub zone_select_timeout_ms: u64,

    /// Tick for response polling and `wait` sleeps
    pub poll_interval_ms: u64,

    /// Capacity of the per-run response queue
    pub response_queue_capacity: usize,

    /// Appended to every command written to the device
    pub line_terminator: String,

    /// Capacity of the event bus
    pub event_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 10_000,
            zone_select_timeout_ms: 5_000,
            poll_interval_ms: 100,
            response_queue_capacity: 1000,
            line_terminator: "\n".to_string(),
            event_capacity: 256,
        }
    }
}

impl ExecutionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn zone_select_timeout(&self) -> Duration {
        Duration::from_millis(self.zone_select_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Initial zone selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    /// Zones selected at startup; empty leaves every zone inactive
    pub active: Vec<u8>,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::ConfigParseFailed {
            format: "TOML".to_string(),
            reason: e.to_string(),
        })
    }

    /// Render as pretty TOML
    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::ConfigSerializationFailed {
            format: "TOML".to_string(),
            reason: e.to_string(),
        })
    }

    /// Names of all configured sequences, sorted
    pub fn sequence_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
