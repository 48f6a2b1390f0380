//! Device Signals
//!
//! Devices report state on their own as `NAME:VALUE` lines. A registered signal
//! maps such a line to a typed variable, and boolean variables are also written
//! to the [`FlagStore`] so sequences can branch on them with `if`. Lines that
//! name no registered signal are ignored.
//!
//! Mappings are configured as `"SIGNAL" = "variable (type)"`:
//!
//! ```toml
//! [signals]
//! TEMP = "temperature (float)"
//! DOOR = "door_closed (bool)"
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::flags::FlagStore;

static SIGNAL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("signal name pattern is valid"));

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("variable name pattern is valid"));

static MAPPING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^()\s]+)\s*\(\s*([A-Za-z]+)\s*\)\s*$").expect("signal mapping pattern is valid")
});

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "on", "enabled"];
const FALSE_WORDS: &[&str] = &["false", "0", "no", "off", "disabled"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("invalid signal name: '{0}' (letters, digits and '_' only)")]
    InvalidSignalName(String),

    #[error("invalid variable name: '{0}'")]
    InvalidVariableName(String),

    #[error("unknown signal type: '{0}'")]
    UnknownType(String),

    #[error("invalid signal mapping '{0}', expected 'variable (type)'")]
    InvalidMapping(String),

    #[error("signal {0} has an empty value")]
    EmptyValue(String),

    #[error("cannot convert '{value}' to {signal_type}: {reason}")]
    Conversion {
        value: String,
        signal_type: SignalType,
        reason: String,
    },
}

/// Value type a signal converts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Float,
    Int,
    String,
    Bool,
    Json,
}

impl SignalType {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Float => "float",
            SignalType::Int => "int",
            SignalType::String => "string",
            SignalType::Bool => "bool",
            SignalType::Json => "json",
        }
    }

    /// Convert a raw value; surrounding whitespace is ignored except for strings
    pub fn convert(self, raw: &str) -> Result<Value, SignalError> {
        let conversion = |reason: String| SignalError::Conversion {
            value: raw.to_string(),
            signal_type: self,
            reason,
        };
        let trimmed = raw.trim();

        match self {
            SignalType::Float => {
                let number = trimmed
                    .parse::<f64>()
                    .map_err(|e| conversion(e.to_string()))?;
                serde_json::Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(|| conversion("not a finite number".to_string()))
            }
            SignalType::Int => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| conversion(e.to_string())),
            SignalType::String => Ok(Value::String(raw.to_string())),
            SignalType::Bool => {
                let word = trimmed.to_lowercase();
                if TRUE_WORDS.contains(&word.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSE_WORDS.contains(&word.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(conversion("not a boolean word".to_string()))
                }
            }
            SignalType::Json => serde_json::from_str(trimmed).map_err(|e| conversion(e.to_string())),
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "float" => Ok(SignalType::Float),
            "int" => Ok(SignalType::Int),
            "string" => Ok(SignalType::String),
            "bool" => Ok(SignalType::Bool),
            "json" => Ok(SignalType::Json),
            _ => Err(SignalError::UnknownType(s.trim().to_string())),
        }
    }
}

/// One signal name bound to a typed variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMapping {
    pub signal_name: String,
    pub variable_name: String,
    pub signal_type: SignalType,
}

impl SignalMapping {
    pub fn new(
        signal_name: &str,
        variable_name: &str,
        signal_type: SignalType,
    ) -> Result<Self, SignalError> {
        if !SIGNAL_NAME.is_match(signal_name) {
            return Err(SignalError::InvalidSignalName(signal_name.to_string()));
        }
        if !VARIABLE_NAME.is_match(variable_name) {
            return Err(SignalError::InvalidVariableName(variable_name.to_string()));
        }
        Ok(Self {
            signal_name: signal_name.to_string(),
            variable_name: variable_name.to_string(),
            signal_type,
        })
    }

    /// Parse a `variable (type)` configuration entry for `signal_name`
    pub fn parse(signal_name: &str, spec: &str) -> Result<Self, SignalError> {
        let captures = MAPPING
            .captures(spec)
            .ok_or_else(|| SignalError::InvalidMapping(spec.to_string()))?;
        let signal_type: SignalType = captures[2].parse()?;
        Self::new(signal_name, &captures[1], signal_type)
    }
}

impl fmt::Display for SignalMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.variable_name, self.signal_type)
    }
}

/// Latest converted value of one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalValue {
    pub signal_name: String,
    pub variable_name: String,
    pub signal_type: SignalType,
    pub value: Value,
    /// Text after the separator, as received
    pub raw: String,
    pub timestamp: DateTime<Utc>,
}

impl SignalValue {
    /// The value as a flag, for boolean signals only
    pub fn as_flag(&self) -> Option<bool> {
        match self.signal_type {
            SignalType::Bool => self.value.as_bool(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalStats {
    pub total_signals: usize,
    pub processed: u64,
    pub errors: u64,
    pub values: usize,
    pub variables: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SignalState {
    mappings: HashMap<String, SignalMapping>,
    values: HashMap<String, SignalValue>,
    variables: HashMap<String, Value>,
    processed: u64,
    errors: u64,
    last_update: Option<DateTime<Utc>>,
}

/// Thread-safe table of signal mappings and their latest values
#[derive(Debug, Default)]
pub struct SignalRegistry {
    state: Mutex<SignalState>,
    flags: Option<Arc<FlagStore>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose boolean variables are mirrored into `flags`
    pub fn with_flags(flags: Arc<FlagStore>) -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            flags: Some(flags),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace the mapping for its signal name
    pub fn register(&self, mapping: SignalMapping) {
        debug!("Signal {} registered as {}", mapping.signal_name, mapping);
        self.lock()
            .mappings
            .insert(mapping.signal_name.clone(), mapping);
    }

    /// Remove a mapping and its last value; returns whether it existed
    pub fn unregister(&self, signal_name: &str) -> bool {
        let mut state = self.lock();
        state.values.remove(signal_name);
        state.mappings.remove(signal_name).is_some()
    }

    /// Replace every mapping from a `SIGNAL = "variable (type)"` table
    ///
    /// Nothing changes unless every entry parses. Values of signals that stay
    /// mapped are kept. Returns the number of mappings loaded.
    pub fn load_config(&self, table: &HashMap<String, String>) -> crate::Result<usize> {
        let mappings = table
            .iter()
            .map(|(name, spec)| {
                SignalMapping::parse(name, spec).map_err(|source| crate::Error::SignalConfigInvalid {
                    signal: name.clone(),
                    source,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let count = mappings.len();
        {
            let mut state = self.lock();
            state.mappings = mappings
                .into_iter()
                .map(|mapping| (mapping.signal_name.clone(), mapping))
                .collect();
            let SignalState {
                mappings, values, ..
            } = &mut *state;
            values.retain(|name, _| mappings.contains_key(name));
        }
        info!("Loaded {} signal mapping(s)", count);
        Ok(count)
    }

    /// Handle one device line
    ///
    /// Returns `None` when the line is not `NAME:VALUE` or names no registered
    /// signal. The line splits on its first `:`.
    pub fn process_line(&self, line: &str) -> Option<Result<SignalValue, SignalError>> {
        let (name, raw) = line.split_once(':')?;
        let name = name.trim();
        let raw = raw.trim_end_matches(['\r', '\n']);

        let result = {
            let mut state = self.lock();
            let mapping = state.mappings.get(name)?.clone();
            state.processed += 1;
            state.last_update = Some(Utc::now());

            let converted = if raw.trim().is_empty() {
                Err(SignalError::EmptyValue(name.to_string()))
            } else {
                mapping.signal_type.convert(raw)
            };

            match converted {
                Ok(value) => {
                    let signal = SignalValue {
                        signal_name: mapping.signal_name.clone(),
                        variable_name: mapping.variable_name.clone(),
                        signal_type: mapping.signal_type,
                        value: value.clone(),
                        raw: raw.to_string(),
                        timestamp: Utc::now(),
                    };
                    state
                        .variables
                        .insert(mapping.variable_name.clone(), value);
                    state.values.insert(mapping.signal_name, signal.clone());
                    Ok(signal)
                }
                Err(e) => {
                    state.errors += 1;
                    Err(e)
                }
            }
        };

        match &result {
            Ok(signal) => {
                debug!("Signal {} -> {} = {}", signal.signal_name, signal.variable_name, signal.value);
                if let (Some(flags), Some(value)) = (&self.flags, signal.as_flag()) {
                    flags.set(&signal.variable_name, value);
                }
            }
            Err(e) => warn!("Signal line '{}' rejected: {}", line, e),
        }
        Some(result)
    }

    /// Handle every line of a chunk, skipping lines that are not signals
    pub fn process_data(&self, data: &str) -> Vec<Result<SignalValue, SignalError>> {
        data.lines().filter_map(|line| self.process_line(line)).collect()
    }

    /// Write a variable directly; booleans also update the flag store
    pub fn update_variable(&self, name: &str, value: Value) {
        let flag = value.as_bool();
        self.lock().variables.insert(name.to_string(), value);
        if let (Some(flags), Some(flag)) = (&self.flags, flag) {
            flags.set(name, flag);
        }
    }

    pub fn get_value(&self, signal_name: &str) -> Option<SignalValue> {
        self.lock().values.get(signal_name).cloned()
    }

    pub fn values(&self) -> HashMap<String, SignalValue> {
        self.lock().values.clone()
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.lock().variables.get(name).cloned()
    }

    pub fn variables(&self) -> HashMap<String, Value> {
        self.lock().variables.clone()
    }

    /// Registered mappings, sorted by signal name
    pub fn mappings(&self) -> Vec<SignalMapping> {
        let mut mappings: Vec<SignalMapping> = self.lock().mappings.values().cloned().collect();
        mappings.sort_by(|a, b| a.signal_name.cmp(&b.signal_name));
        mappings
    }

    pub fn statistics(&self) -> SignalStats {
        let state = self.lock();
        SignalStats {
            total_signals: state.mappings.len(),
            processed: state.processed,
            errors: state.errors,
            values: state.values.len(),
            variables: state.variables.len(),
            last_update: state.last_update,
        }
    }

    /// Drop mappings, values, variables and counters
    pub fn clear_all(&self) {
        *self.lock() = SignalState::default();
    }

    pub fn len(&self) -> usize {
        self.lock().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().mappings.is_empty()
    }
}
