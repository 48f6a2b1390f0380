//! Response classification for the send/await protocol
//!
//! A device answers each command with zero or more lines. Lines are matched
//! case-insensitively against the configured keyword sets:
//!
//! - `complete_line`: the whole trimmed line equals a keyword, the command is done
//! - `error`: a keyword appears as a whole word, the command failed
//! - `received` / `complete`: informational, logged only

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Keyword sets used to interpret device responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceKeywords {
    /// Words that mention completion anywhere in a line
    pub complete: Vec<String>,
    /// Acknowledgement words
    pub received: Vec<String>,
    /// Words that mark a failed command
    pub error: Vec<String>,
    /// Lines that, on their own, finish a command
    pub complete_line: Vec<String>,
}

impl Default for SequenceKeywords {
    fn default() -> Self {
        Self {
            complete: vec!["complete".into(), "completed".into(), "done".into()],
            received: vec!["received".into()],
            error: vec!["err".into(), "error".into(), "fail".into()],
            complete_line: vec!["complete".into(), "completed".into()],
        }
    }
}

/// How one response line was understood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Line equals a `complete_line` keyword
    Completed,
    /// Line contains an `error` keyword as a whole word
    Error,
    /// Line acknowledges receipt
    Received,
    /// Line mentions completion without being a completion line
    Progress,
    /// Anything else
    Other,
}

fn whole_word_pattern(words: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Ok(Some(Regex::new(&pattern)?))
}

/// Compiled form of [`SequenceKeywords`]
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    complete_lines: Vec<String>,
    error: Option<Regex>,
    received: Option<Regex>,
    complete: Option<Regex>,
}

impl ResponseMatcher {
    pub fn new(keywords: &SequenceKeywords) -> Result<Self> {
        Ok(Self {
            complete_lines: keywords
                .complete_line
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            error: whole_word_pattern(&keywords.error)?,
            received: whole_word_pattern(&keywords.received)?,
            complete: whole_word_pattern(&keywords.complete)?,
        })
    }

    pub fn classify(&self, line: &str) -> ResponseKind {
        let normalized = line.trim().to_lowercase();
        if self.complete_lines.iter().any(|k| *k == normalized) {
            return ResponseKind::Completed;
        }
        if matches(&self.error, line) {
            return ResponseKind::Error;
        }
        if matches(&self.received, line) {
            return ResponseKind::Received;
        }
        if matches(&self.complete, line) {
            return ResponseKind::Progress;
        }
        ResponseKind::Other
    }
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        let keywords = SequenceKeywords::default();
        Self {
            complete_lines: keywords.complete_line.clone(),
            error: whole_word_pattern(&keywords.error).ok().flatten(),
            received: whole_word_pattern(&keywords.received).ok().flatten(),
            complete: whole_word_pattern(&keywords.complete).ok().flatten(),
        }
    }
}

fn matches(pattern: &Option<Regex>, line: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(line))
}
