//! linkseq - command sequence execution engine for serial-linked devices
//!
//! Named sequences of textual directives are resolved into flat command lists
//! and executed against a device that speaks a line-oriented protocol: every
//! command is written as one line and the device answers with status lines
//! until it reports completion or an error.
//!
//! ## Features
//!
//! - **Sequence Resolution:** Nested sequences and button aliases flatten into
//!   one directive list, with cycle detection, a depth limit and a cache
//! - **Control Flow:** `if <flag>` / `else` / `endif`, `stop_if_not <flag>`,
//!   `wait <seconds>`
//! - **Multizone Fan-out:** `og_multizone-<cmd>` runs `<cmd>` once per active
//!   zone, selecting each zone on the device first
//! - **Send/Await Protocol:** Configurable keyword sets, per-command timeouts,
//!   bounded response buffering
//! - **Cancellation:** Any wait or pending command is interrupted within one
//!   poll interval
//! - **Device Signals:** `NAME:VALUE` lines from the device update typed
//!   variables; boolean ones become flags
//! - **Events:** Progress, sent commands, responses, zone and flag changes are
//!   broadcast to any number of subscribers
//! - **Configuration:** TOML (or JSON) files with hot reload
//!
//! ## Module Organization
//!
//! ### Resolution
//!
//! - [`directive`] - Directive classification and list validation
//! - [`resolver`] - Sequence library and recursive expansion
//! - [`recursion`] - Expansion path tracking and the resolution cache
//!
//! ### Execution
//!
//! - [`executor`] - The per-run state machine and the device protocol
//! - [`runner`] - Session owner that allows one run at a time
//! - [`link`] - Device link trait and its stream and channel backends
//! - [`flags`] - Named boolean flags
//! - [`signals`] - Device signal mappings and their latest values
//! - [`zones`] - Zone selection and per-zone status
//! - [`events`] - Broadcast event bus
//!
//! ### Support
//!
//! - [`config`] - Configuration loading, validation and watching
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use linkseq::events::EventBus;
//! use linkseq::executor::ResponseRouter;
//! use linkseq::link::{spawn_simulated_device, ChannelLink};
//! use linkseq::{Config, SequenceRunner};
//!
//! # async fn demo() -> linkseq::Result<()> {
//! let config = Config::from_toml_str(r#"
//!     [sequences]
//!     prime = ["home", "wait 0.5", "purge"]
//! "#)?;
//!
//! let router = Arc::new(ResponseRouter::new(EventBus::default()));
//! let (link, commands) = ChannelLink::pair();
//! spawn_simulated_device(commands, router.clone(), Duration::ZERO, |_| {
//!     vec!["complete".to_string()]
//! });
//!
//! let runner = SequenceRunner::from_config(&config, Arc::new(link), router)?;
//! let outcome = runner.run("prime").await?;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Everything runs on the tokio runtime:
//!
//! - **Run Task:** Each run is one spawned task owning its executor
//! - **Link Reader:** A task decodes device lines and hands them to the
//!   [`executor::ResponseRouter`], which queues them for the active run
//! - **Shared Stores:** Flags, zones and the resolution cache sit behind
//!   mutexes and are safe to touch from any thread
//!
//! ## Safety and Reliability
//!
//! - **No Panics:** All fallible operations return `Result`
//! - **Bounded Buffers:** Response queues drop their oldest line when full
//! - **Upfront Validation:** A malformed list is refused before anything is sent

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod directive;
pub mod error;
pub mod events;
pub mod executor;
pub mod flags;
pub mod link;
pub mod recursion;
pub mod resolver;
pub mod runner;
pub mod signals;
pub mod zones;

// Re-exports for core functionality
pub use config::Config;
pub use error::{Error, Result};

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;
pub use config::watcher::ConfigWatcher;
pub use directive::{Directive, DirectiveClassifier};
pub use events::{EventBus, SequenceEvent};
pub use executor::{ExecutorState, RunOutcome, SequenceExecutor};
pub use flags::FlagStore;
pub use link::DeviceLink;
pub use resolver::{SequenceLibrary, SequenceResolver};
pub use runner::SequenceRunner;
pub use signals::{SignalRegistry, SignalType};
pub use zones::{ZoneRegistry, ZoneStatus};

/// The current version of linkseq from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The crate description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Load configuration from the default search paths
///
/// Falls back to [`Config::default`] when no file is found or the file found
/// cannot be used, logging why.
///
/// # Examples
///
/// ```no_run
/// let config = linkseq::init().expect("defaults always load");
/// println!("{} sequence(s)", config.sequences.len());
/// ```
pub fn init() -> Result<Config> {
    info!("Initializing {} v{}", NAME, VERSION);

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    };

    log_summary(&config);
    Ok(config)
}

/// Load configuration from one specific file
///
/// # Errors
///
/// Unlike [`init`], a missing, unparsable or invalid file is an error.
pub fn init_with_config(config_path: &std::path::Path) -> Result<Config> {
    info!(
        "Initializing {} v{} with config: {}",
        NAME,
        VERSION,
        config_path.display()
    );

    let config = ConfigLoader::new().load_from_path(config_path).map_err(|e| {
        error!(
            "Failed to load configuration from {}: {}",
            config_path.display(),
            e
        );
        e
    })?;

    log_summary(&config);
    Ok(config)
}

fn log_summary(config: &Config) {
    info!(
        "{} sequence(s), {} button(s), {} flag(s) configured",
        config.sequences.len(),
        config.buttons.len(),
        config.flags.len()
    );
}

/// Human-readable explanation of a startup failure with suggestions
pub fn handle_startup_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => format!(
            "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check the path and file permissions\n• Run without --config to use defaults",
            path.display(),
            reason
        ),
        Error::ConfigParseFailed { format, reason } => format!(
            "Configuration Error: Failed to parse {} config: {}\n\nTry:\n• Check configuration file syntax\n• Ensure file is valid {}",
            format, reason, format
        ),
        Error::ConfigValidationFailed { field, reason } => format!(
            "Configuration Error: Validation failed for '{}': {}\n\nTry:\n• Check configuration value\n• Remove the field to use its default",
            field, reason
        ),
        Error::ConfigNotFound => {
            "Configuration Error: Config file not found\n\nTry:\n• Create a configuration file\n• Pass one with --config".to_string()
        }
        Error::Io(err) => format!(
            "I/O Error: {}\n\nTry:\n• Check file permissions\n• Check that the device is attached",
            err
        ),
        _ => format!(
            "Unexpected Error: {}\n\nPlease report this issue with debug logs enabled",
            error
        ),
    }
}

/// Name, version and build details
pub fn app_info() -> std::collections::HashMap<String, String> {
    let mut info = std::collections::HashMap::new();

    info.insert("name".to_string(), NAME.to_string());
    info.insert("version".to_string(), VERSION.to_string());
    info.insert("description".to_string(), DESCRIPTION.to_string());
    info.insert(
        "build_profile".to_string(),
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
        .to_string(),
    );
    info.insert("platform".to_string(), std::env::consts::OS.to_string());

    info
}

/// Get default configuration
///
/// # Examples
///
/// ```
/// let config = linkseq::default_config();
/// assert_eq!(config.limits.max_recursion_depth, 10);
/// ```
pub fn default_config() -> Config {
    Config::default()
}
