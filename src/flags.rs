//! Flag Store
//!
//! Named boolean flags shared between the executor and its callers. Missing flags
//! read as `false`; a flag exists from its first write until it is cleared.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe map of flag name to boolean value
#[derive(Debug, Default)]
pub struct FlagStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read a flag, `false` when unset
    pub fn get(&self, name: &str) -> bool {
        self.get_or(name, false)
    }

    /// Read a flag with an explicit default
    pub fn get_or(&self, name: &str, default: bool) -> bool {
        self.lock().get(name).copied().unwrap_or(default)
    }

    pub fn set(&self, name: &str, value: bool) {
        self.lock().insert(name.to_string(), value);
        debug!("Flag '{}' set to {}", name, value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Remove one flag; returns whether it existed
    pub fn clear(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// Snapshot of every flag
    pub fn get_all(&self) -> HashMap<String, bool> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Import flags from a configuration table
    ///
    /// Only boolean values are taken; anything else is skipped with a debug log.
    /// The whole import happens under one lock. Returns the number imported.
    pub fn load_from(&self, table: &HashMap<String, toml::Value>) -> usize {
        let mut skipped = Vec::new();
        let imported = {
            let mut flags = self.lock();
            let mut imported = 0;
            for (name, value) in table {
                match value.as_bool() {
                    Some(b) => {
                        flags.insert(name.clone(), b);
                        imported += 1;
                    }
                    None => skipped.push(name.as_str()),
                }
            }
            imported
        };
        for name in skipped {
            debug!("Skipping non-boolean flag '{}': {}", name, table[name]);
        }
        info!("Loaded {} flag(s) from configuration", imported);
        imported
    }
}
