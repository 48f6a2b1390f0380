//! Configuration File Loading
//!
//! Finds, loads, validates and saves configuration files. TOML is the primary
//! format; JSON is accepted wherever TOML is.

use super::Config;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Largest accepted `limits.max_wait_time`, in seconds
pub const MAX_WAIT_TIME_CEILING: f64 = 1_000_000_000.0;

/// Largest accepted command and zone-select timeout (one day)
pub const MAX_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files (without extension)
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats, in lookup order
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }

    /// Format implied by a file extension; unknown extensions read as TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether to fall back to the default config if none exists
    pub create_default: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::load_with_options(LoadOptions::default())
    }

    /// Load configuration with custom options
    pub fn load_with_options(options: LoadOptions) -> Result<Config> {
        Self::new().load_with(options)
    }

    /// Load from this loader's search paths
    pub fn load_with(&mut self, options: LoadOptions) -> Result<Config> {
        if let Some((path, config)) = self.find_and_load_config()? {
            if options.validate {
                self.validate_config(&config)?;
            }
            info!("Loaded configuration from {}", path.display());
            self.current_path = Some(path);
            return Ok(config);
        }

        if options.create_default {
            debug!("No configuration file found, using defaults");
            let config = Config::default();
            if options.validate {
                self.validate_config(&config)?;
            }
            Ok(config)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Load and validate one specific file
    pub fn load_from_path(&mut self, path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        let config = self.load_config_file(path, ConfigFormat::from_path(path))?;
        self.validate_config(&config)?;
        self.current_path = Some(path.to_path_buf());
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the current path or default location
    pub fn save(&self, config: &Config) -> Result<PathBuf> {
        let path = self
            .current_path
            .clone()
            .unwrap_or_else(Self::get_default_config_path);
        self.save_to_path(config, &path)?;
        Ok(path)
    }

    /// Save configuration to a specific path, format chosen by extension
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let format = ConfigFormat::from_path(path);
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for path in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = self.get_config_path_for_format(path, *format);

                if config_path.exists() {
                    match self.load_config_file(&config_path, *format) {
                        Ok(config) => return Ok(Some((config_path, config))),
                        Err(e) => {
                            warn!(
                                "Failed to load config from {}: {}",
                                config_path.display(),
                                e
                            );
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Load a specific configuration file
    pub fn load_config_file(&self, path: &Path, format: ConfigFormat) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: format.name().to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Get configuration file path for a specific format
    fn get_config_path_for_format(&self, base_path: &Path, format: ConfigFormat) -> PathBuf {
        base_path.with_extension(format.extension())
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("linkseq").join("config"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("linkseq").join("config"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".linkseq").join("config"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join("linkseq"));
        }

        paths
    }

    /// Get the default configuration path
    fn get_default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linkseq")
            .join("config.toml")
    }

    /// Validate configuration
    pub fn validate_config(&self, config: &Config) -> Result<()> {
        let limits = &config.limits;
        if limits.max_recursion_depth == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "limits.max_recursion_depth".to_string(),
                reason: "Recursion depth must be greater than 0".to_string(),
            });
        }

        if !limits.max_wait_time.is_finite() || limits.max_wait_time < 0.0 {
            return Err(Error::ConfigValidationFailed {
                field: "limits.max_wait_time".to_string(),
                reason: "Maximum wait time must be a non-negative number".to_string(),
            });
        }

        if limits.max_wait_time > MAX_WAIT_TIME_CEILING {
            return Err(Error::ConfigValidationFailed {
                field: "limits.max_wait_time".to_string(),
                reason: format!(
                    "Maximum wait time cannot exceed {} seconds",
                    MAX_WAIT_TIME_CEILING
                ),
            });
        }

        if limits.max_directive_length == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "limits.max_directive_length".to_string(),
                reason: "Directive length limit must be greater than 0".to_string(),
            });
        }

        let execution = &config.execution;
        if execution.command_timeout_ms == 0 || execution.command_timeout_ms > MAX_TIMEOUT_MS {
            return Err(Error::ConfigValidationFailed {
                field: "execution.command_timeout_ms".to_string(),
                reason: format!("Command timeout must be between 1 and {} ms", MAX_TIMEOUT_MS),
            });
        }

        if execution.zone_select_timeout_ms == 0 || execution.zone_select_timeout_ms > MAX_TIMEOUT_MS
        {
            return Err(Error::ConfigValidationFailed {
                field: "execution.zone_select_timeout_ms".to_string(),
                reason: format!(
                    "Zone select timeout must be between 1 and {} ms",
                    MAX_TIMEOUT_MS
                ),
            });
        }

        if execution.poll_interval_ms == 0 || execution.poll_interval_ms > 1000 {
            return Err(Error::ConfigValidationFailed {
                field: "execution.poll_interval_ms".to_string(),
                reason: "Poll interval must be between 1 and 1000 milliseconds".to_string(),
            });
        }

        if execution.response_queue_capacity == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "execution.response_queue_capacity".to_string(),
                reason: "Response queue capacity must be greater than 0".to_string(),
            });
        }

        if execution.event_capacity == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "execution.event_capacity".to_string(),
                reason: "Event capacity must be greater than 0".to_string(),
            });
        }

        if config.sequence_keywords.complete_line.is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "sequence_keywords.complete_line".to_string(),
                reason: "At least one completion line is required".to_string(),
            });
        }

        if !config.zones.active.is_empty() {
            if let Err(e) = crate::zones::selection_mask(&config.zones.active) {
                return Err(Error::ConfigValidationFailed {
                    field: "zones.active".to_string(),
                    reason: e.to_string(),
                });
            }
        }

        for (signal, spec) in &config.signals {
            if let Err(e) = crate::signals::SignalMapping::parse(signal, spec) {
                return Err(Error::ConfigValidationFailed {
                    field: format!("signals.{}", signal),
                    reason: e.to_string(),
                });
            }
        }

        if let Some(name) = config.sequences.keys().find(|name| name.trim().is_empty()) {
            return Err(Error::ConfigValidationFailed {
                field: format!("sequences.{:?}", name),
                reason: "Sequence names cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
