//! Recursion Guard
//!
//! Bounds nested sequence expansion. Each top-level expansion owns an
//! [`ExpansionPath`] holding the names currently in progress, so concurrent
//! expansions never see each other's state. Resolved lists are memoised in a
//! cache shared by all callers, keyed by the sequence name plus its ancestors.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::Error;

/// Default nesting limit for sequence expansion
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10;

/// Cache signature for expanding `name` beneath the given ancestors
///
/// Ancestors are sorted and comma-joined, so the same set in any order yields the
/// same key: `"name:a,b"`.
pub fn cache_key<'a, I>(name: &str, ancestors: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = ancestors.into_iter().collect();
    sorted.sort_unstable();
    format!("{}:{}", name, sorted.join(","))
}

/// Names currently being expanded along one call path
#[derive(Debug, Clone)]
pub struct ExpansionPath {
    stack: Vec<String>,
    max_depth: usize,
}

impl ExpansionPath {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    /// Try to start expanding `name`
    ///
    /// Refuses without pushing when `name` is already in progress or the path is
    /// already `max_depth` deep.
    pub fn enter(&mut self, name: &str) -> bool {
        if self.stack.len() >= self.max_depth {
            let refused = Error::RecursionLimit {
                name: name.to_string(),
                depth: self.stack.len(),
            };
            warn!("{} (limit {})", refused, self.max_depth);
            return false;
        }
        if self.contains(name) {
            warn!("Cycle detected: '{}' is already being expanded", name);
            return false;
        }
        self.stack.push(name.to_string());
        true
    }

    /// Finish expanding `name`
    pub fn exit(&mut self, name: &str) {
        if self.stack.last().map(String::as_str) == Some(name) {
            self.stack.pop();
        } else if let Some(pos) = self.stack.iter().rposition(|n| n == name) {
            self.stack.remove(pos);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stack.iter().any(|n| n == name)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Names in progress, outermost first
    pub fn names(&self) -> &[String] {
        &self.stack
    }

    /// Cache key for expanding `name` from the current position
    pub fn cache_key(&self, name: &str) -> String {
        cache_key(name, self.stack.iter().map(String::as_str))
    }
}

/// Depth limit plus the shared expansion cache
#[derive(Debug)]
pub struct RecursionGuard {
    max_depth: usize,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for RecursionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECURSION_DEPTH)
    }
}

impl RecursionGuard {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Fresh path for a new top-level expansion
    pub fn path(&self) -> ExpansionPath {
        ExpansionPath::new(self.max_depth)
    }

    pub fn get_cached(&self, key: &str) -> Option<Vec<String>> {
        self.lock().get(key).cloned()
    }

    pub fn put_cached(&self, key: String, resolved: Vec<String>) {
        self.lock().insert(key, resolved);
    }

    pub fn clear_cache(&self) {
        let mut cache = self.lock();
        debug!("Clearing expansion cache ({} entries)", cache.len());
        cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.lock().len()
    }
}
