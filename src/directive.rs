//! Directive Classification and Validation
//!
//! Turns raw directive strings into typed [`Directive`] values and checks whole
//! directive lists for balanced `if`/`else`/`endif` blocks.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! wait <seconds>
//! if <flag_name>
//! else
//! endif
//! stop_if_not <flag_name>
//! og_multizone-<identifier>
//! <anything else>
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upper bound for `wait`, in seconds
pub const DEFAULT_MAX_WAIT_TIME: f64 = 3600.0;

/// Default upper bound for the length of a single directive, in characters
pub const DEFAULT_MAX_DIRECTIVE_LENGTH: usize = 1000;

/// Prefix marking a multizone fan-out directive
pub const MULTIZONE_PREFIX: &str = "og_multizone-";

static FLAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("flag name pattern is valid"));

static MULTIZONE_BASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("multizone base pattern is valid"));

/// A classified directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Plain command forwarded to the device
    Regular { command: String },
    /// Pause for the given number of seconds
    Wait { seconds: f64 },
    /// Open a conditional block on a flag
    If { flag: String },
    /// Switch to the alternate branch of the innermost block
    Else,
    /// Close the innermost block
    EndIf,
    /// Abort the run when the flag is false
    StopIfNot { flag: String },
    /// Run the base command once per active zone
    Multizone { base_command: String },
}

impl Directive {
    /// Whether this directive only affects control flow
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Directive::If { .. } | Directive::Else | Directive::EndIf | Directive::StopIfNot { .. }
        )
    }

    /// Flag referenced by this directive, if any
    pub fn flag(&self) -> Option<&str> {
        match self {
            Directive::If { flag } | Directive::StopIfNot { flag } => Some(flag),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Regular { command } => write!(f, "{}", command),
            Directive::Wait { seconds } => write!(f, "wait {}", seconds),
            Directive::If { flag } => write!(f, "if {}", flag),
            Directive::Else => write!(f, "else"),
            Directive::EndIf => write!(f, "endif"),
            Directive::StopIfNot { flag } => write!(f, "stop_if_not {}", flag),
            Directive::Multizone { base_command } => {
                write!(f, "{}{}", MULTIZONE_PREFIX, base_command)
            }
        }
    }
}

/// Reasons a single directive fails classification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectiveError {
    #[error("empty directive")]
    Empty,

    #[error("directive too long: {len} characters (maximum {max})")]
    TooLong { len: usize, max: usize },

    #[error("wait time is missing")]
    MissingWaitTime,

    #[error("wait time cannot be negative: {0}")]
    NegativeWaitTime(f64),

    #[error("wait time {value} exceeds maximum of {max} seconds")]
    WaitTimeExceedsMaximum { value: f64, max: f64 },

    #[error("wait time is not a number: '{0}'")]
    NonNumericWaitTime(String),

    #[error("'{keyword}' requires a flag name")]
    MissingFlagName { keyword: String },

    #[error("invalid flag name: '{0}'")]
    InvalidFlagName(String),

    #[error("'{keyword}' takes {expected} argument(s), got {got}")]
    TooManyArguments {
        keyword: String,
        expected: usize,
        got: usize,
    },

    #[error("multizone directive has no base command")]
    MissingMultizoneBase,

    #[error("invalid multizone base command: '{0}' (letters, digits, '_' and '-' only)")]
    InvalidMultizoneBase(String),
}

/// Result of validating a whole directive list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl SequenceValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Build a failed report with a single message
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::from_errors(vec![message.into()])
    }
}

/// Classifies raw strings into [`Directive`] values
#[derive(Debug, Clone)]
pub struct DirectiveClassifier {
    max_wait_time: f64,
    max_directive_length: usize,
}

impl Default for DirectiveClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT_TIME, DEFAULT_MAX_DIRECTIVE_LENGTH)
    }
}

impl DirectiveClassifier {
    /// Create a classifier with explicit limits
    pub fn new(max_wait_time: f64, max_directive_length: usize) -> Self {
        Self {
            max_wait_time,
            max_directive_length,
        }
    }

    pub fn max_wait_time(&self) -> f64 {
        self.max_wait_time
    }

    /// Classify a raw directive string
    pub fn classify(&self, raw: &str) -> Result<Directive, DirectiveError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(DirectiveError::Empty);
        }

        let len = text.chars().count();
        if len > self.max_directive_length {
            return Err(DirectiveError::TooLong {
                len,
                max: self.max_directive_length,
            });
        }

        if is_wait(text) {
            return self.classify_wait(text);
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let keyword = tokens[0].to_ascii_lowercase();

        match keyword.as_str() {
            "if" => Ok(Directive::If {
                flag: flag_argument("if", &tokens)?,
            }),
            "stop_if_not" => Ok(Directive::StopIfNot {
                flag: flag_argument("stop_if_not", &tokens)?,
            }),
            "else" => no_arguments("else", &tokens).map(|_| Directive::Else),
            "endif" => no_arguments("endif", &tokens).map(|_| Directive::EndIf),
            _ if starts_with_ignore_case(text, MULTIZONE_PREFIX) => {
                let base = text[MULTIZONE_PREFIX.len()..].trim();
                if base.is_empty() {
                    Err(DirectiveError::MissingMultizoneBase)
                } else if !MULTIZONE_BASE.is_match(base) {
                    Err(DirectiveError::InvalidMultizoneBase(base.to_string()))
                } else {
                    Ok(Directive::Multizone {
                        base_command: base.to_string(),
                    })
                }
            }
            _ => Ok(Directive::Regular {
                command: text.to_string(),
            }),
        }
    }

    fn classify_wait(&self, text: &str) -> Result<Directive, DirectiveError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.len() {
            1 => Err(DirectiveError::MissingWaitTime),
            2 => {
                let value = tokens[1];
                let seconds: f64 = value
                    .parse()
                    .map_err(|_| DirectiveError::NonNumericWaitTime(value.to_string()))?;
                if !seconds.is_finite() {
                    return Err(DirectiveError::NonNumericWaitTime(value.to_string()));
                }
                if seconds < 0.0 {
                    return Err(DirectiveError::NegativeWaitTime(seconds));
                }
                if seconds > self.max_wait_time {
                    return Err(DirectiveError::WaitTimeExceedsMaximum {
                        value: seconds,
                        max: self.max_wait_time,
                    });
                }
                Ok(Directive::Wait { seconds })
            }
            got => Err(DirectiveError::TooManyArguments {
                keyword: "wait".to_string(),
                expected: 1,
                got: got - 1,
            }),
        }
    }

    /// Validate a directive list, accumulating every error found
    ///
    /// Each directive is classified on its own, then `if`/`else`/`endif` balance is
    /// checked across the list: `else` and `endif` need an open `if`, an `if`
    /// block takes at most one `else`, and no `if` may remain open at the end.
    pub fn validate_sequence<S: AsRef<str>>(&self, directives: &[S]) -> SequenceValidation {
        let mut errors = Vec::new();
        // One entry per open `if`: whether its `else` was already seen
        let mut open_blocks: Vec<bool> = Vec::new();

        for (index, raw) in directives.iter().enumerate() {
            let position = index + 1;
            match self.classify(raw.as_ref()) {
                Ok(Directive::If { .. }) => open_blocks.push(false),
                Ok(Directive::Else) => match open_blocks.last_mut() {
                    Some(seen_else) if *seen_else => {
                        errors.push(format!("directive {}: duplicate else in if block", position))
                    }
                    Some(seen_else) => *seen_else = true,
                    None => errors.push(format!("directive {}: else without if", position)),
                },
                Ok(Directive::EndIf) => {
                    if open_blocks.pop().is_none() {
                        errors.push(format!("directive {}: endif without if", position));
                    }
                }
                Ok(_) => {}
                Err(e) => errors.push(format!("directive {}: {}", position, e)),
            }
        }

        if !open_blocks.is_empty() {
            errors.push(format!("{} if block(s) without endif", open_blocks.len()));
        }

        SequenceValidation::from_errors(errors)
    }
}

/// `wait` is recognised by a case-insensitive prefix
pub fn is_wait(text: &str) -> bool {
    starts_with_ignore_case(text.trim_start(), "wait")
}

/// Whether the name is a legal flag identifier
pub fn is_valid_flag_name(name: &str) -> bool {
    FLAG_NAME.is_match(name)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn flag_argument(keyword: &str, tokens: &[&str]) -> Result<String, DirectiveError> {
    match tokens.len() {
        1 => Err(DirectiveError::MissingFlagName {
            keyword: keyword.to_string(),
        }),
        2 if is_valid_flag_name(tokens[1]) => Ok(tokens[1].to_string()),
        2 => Err(DirectiveError::InvalidFlagName(tokens[1].to_string())),
        got => Err(DirectiveError::TooManyArguments {
            keyword: keyword.to_string(),
            expected: 1,
            got: got - 1,
        }),
    }
}

fn no_arguments(keyword: &str, tokens: &[&str]) -> Result<(), DirectiveError> {
    if tokens.len() == 1 {
        Ok(())
    } else {
        Err(DirectiveError::TooManyArguments {
            keyword: keyword.to_string(),
            expected: 0,
            got: tokens.len() - 1,
        })
    }
}
