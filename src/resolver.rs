//! Sequence Resolver
//!
//! Expands a named sequence into a flat list of directive strings. Items naming a
//! button are replaced by the button's command, items naming another sequence are
//! expanded in place, and everything else is classified and kept when valid.
//!
//! A malformed or cyclic branch never aborts an expansion; it contributes nothing
//! and leaves a log line behind.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::directive::{is_wait, DirectiveClassifier, SequenceValidation};
use crate::recursion::{ExpansionPath, RecursionGuard};

/// Named sequences plus the button command map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceLibrary {
    #[serde(default)]
    pub sequences: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub buttons: HashMap<String, String>,
}

impl SequenceLibrary {
    pub fn new(
        sequences: HashMap<String, Vec<String>>,
        buttons: HashMap<String, String>,
    ) -> Self {
        Self { sequences, buttons }
    }

    /// Library view of a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sequences.clone(), config.buttons.clone())
    }
}

/// Summary of one sequence after expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub name: String,
    pub exists: bool,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub command_count: usize,
    pub commands: Vec<String>,
    pub used_flags: BTreeSet<String>,
}

/// A library together with the cache built from it
#[derive(Debug)]
struct Snapshot {
    library: SequenceLibrary,
    guard: RecursionGuard,
}

/// Expands named sequences; safe to share between threads
#[derive(Debug)]
pub struct SequenceResolver {
    snapshot: RwLock<Arc<Snapshot>>,
    max_depth: usize,
    classifier: DirectiveClassifier,
}

impl SequenceResolver {
    pub fn new(library: SequenceLibrary, max_depth: usize, classifier: DirectiveClassifier) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot {
                library,
                guard: RecursionGuard::new(max_depth),
            })),
            max_depth,
            classifier,
        }
    }

    /// Resolver with default limits
    pub fn with_library(library: SequenceLibrary) -> Self {
        Self::new(
            library,
            crate::recursion::DEFAULT_MAX_RECURSION_DEPTH,
            DirectiveClassifier::default(),
        )
    }

    /// Resolver configured from the `[limits]`, `[sequences]` and `[buttons]` sections
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SequenceLibrary::from_config(config),
            config.limits.max_recursion_depth,
            config.limits.classifier(),
        )
    }

    fn current(&self) -> Arc<Snapshot> {
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn classifier(&self) -> &DirectiveClassifier {
        &self.classifier
    }

    /// Replace the library and drop every cached expansion
    ///
    /// Expansions already running finish against the library they started with.
    pub fn reload(&self, library: SequenceLibrary) {
        let sequence_count = library.sequences.len();
        let fresh = Arc::new(Snapshot {
            library,
            guard: RecursionGuard::new(self.max_depth),
        });
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
        info!("Sequence library reloaded ({} sequences)", sequence_count);
    }

    pub fn clear_cache(&self) {
        self.current().guard.clear_cache();
    }

    pub fn cache_len(&self) -> usize {
        self.current().guard.cache_len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current().library.sequences.contains_key(name)
    }

    /// Names of all sequences, sorted
    pub fn sequence_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.current().library.sequences.keys().cloned().collect();
        names.sort();
        names
    }

    /// Expand `name` into a flat directive list
    ///
    /// Unknown names and refused expansions yield an empty list.
    pub fn expand(&self, name: &str) -> Vec<String> {
        let snapshot = self.current();
        let mut path = snapshot.guard.path();
        let resolved = self.expand_in(&snapshot, name, &mut path);
        debug!("Expanded '{}' into {} directive(s)", name, resolved.len());
        resolved
    }

    fn expand_in(&self, snapshot: &Snapshot, name: &str, path: &mut ExpansionPath) -> Vec<String> {
        let library = &snapshot.library;
        let Some(items) = library.sequences.get(name) else {
            error!("Sequence '{}' not found", name);
            return Vec::new();
        };

        let key = path.cache_key(name);
        if !path.enter(name) {
            return Vec::new();
        }

        if let Some(cached) = snapshot.guard.get_cached(&key) {
            path.exit(name);
            return cached;
        }

        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let text = item.trim();

            if is_wait(text) {
                match self.classifier.classify(text) {
                    Ok(_) => resolved.push(text.to_string()),
                    Err(e) => warn!("Skipping '{}' in sequence '{}': {}", text, name, e),
                }
                continue;
            }

            if let Some(command) = library.buttons.get(text) {
                resolved.push(command.clone());
                continue;
            }

            if library.sequences.contains_key(text) {
                if path.contains(text) {
                    warn!(
                        "Skipping nested '{}' in sequence '{}': already being expanded",
                        text, name
                    );
                    continue;
                }
                resolved.extend(self.expand_in(snapshot, text, path));
                continue;
            }

            match self.classifier.classify(text) {
                Ok(_) => resolved.push(text.to_string()),
                Err(e) => warn!("Skipping '{}' in sequence '{}': {}", text, name, e),
            }
        }

        snapshot.guard.put_cached(key, resolved.clone());
        path.exit(name);
        resolved
    }

    /// Expand `name` and validate the result as a whole
    pub fn validate(&self, name: &str) -> SequenceValidation {
        let resolved = self.expand(name);
        if resolved.is_empty() {
            return SequenceValidation::invalid(format!(
                "sequence '{}' is empty or not found",
                name
            ));
        }
        self.classifier.validate_sequence(&resolved)
    }

    /// Expansion, validation and flag usage for one sequence
    pub fn sequence_info(&self, name: &str) -> SequenceInfo {
        let exists = self.contains(name);
        let commands = self.expand(name);
        let validation = if commands.is_empty() {
            SequenceValidation::invalid(format!("sequence '{}' is empty or not found", name))
        } else {
            self.classifier.validate_sequence(&commands)
        };

        SequenceInfo {
            name: name.to_string(),
            exists,
            is_valid: validation.is_valid,
            errors: validation.errors,
            command_count: commands.len(),
            used_flags: self.used_flags(&commands),
            commands,
        }
    }

    /// Flags referenced by `if` and `stop_if_not` directives
    pub fn used_flags<S: AsRef<str>>(&self, directives: &[S]) -> BTreeSet<String> {
        directives
            .iter()
            .filter_map(|raw| self.classifier.classify(raw.as_ref()).ok())
            .filter_map(|directive| directive.flag().map(str::to_string))
            .collect()
    }
}
