//! Configuration File Watcher
//!
//! Watches the loaded configuration file and re-reads it when it changes, so
//! sequence libraries can be edited without restarting the session. A reload
//! that fails to parse or validate keeps the previous configuration.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use super::loader::{ConfigFormat, ConfigLoader};
use super::Config;
use crate::error::{Error, Result};

/// Delay before re-reading, some editors save in several steps
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// How often the background task polls for file events
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ConfigWatcher {
    config_path: PathBuf,
    _watcher: RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    loader: ConfigLoader,
    current_config: Mutex<Config>,
    is_watching: Arc<AtomicBool>,
}

impl ConfigWatcher {
    /// Start watching `config_path`
    ///
    /// # Errors
    /// Returns [`Error::ConfigWatchFailed`] if the platform watcher cannot be
    /// created or the file has no parent directory.
    pub fn new(config_path: PathBuf, initial_config: Config) -> Result<Self> {
        let (event_tx, event_rx) = channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = event_tx.send(res) {
                error!("Failed to send file watch event: {}", e);
            }
        })
        .map_err(|e| Error::ConfigWatchFailed {
            reason: format!("Failed to create watcher: {}", e),
        })?;

        // Watch the directory; editors that replace the file break a file watch
        let watch_path = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::ConfigWatchFailed {
                reason: format!("Failed to watch {}: {}", watch_path.display(), e),
            })?;

        info!("Watching config file: {}", config_path.display());

        Ok(Self {
            config_path,
            _watcher: watcher,
            event_rx,
            loader: ConfigLoader::new(),
            current_config: Mutex::new(initial_config),
            is_watching: Arc::new(AtomicBool::new(true)),
        })
    }

    fn lock_config(&self) -> MutexGuard<'_, Config> {
        self.current_config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The last configuration that loaded successfully
    pub fn get_config(&self) -> Config {
        self.lock_config().clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Drain pending file events and reload if the config file changed
    ///
    /// Returns `Ok(Some(config))` after a successful reload and `Ok(None)`
    /// when nothing relevant happened.
    pub fn check_and_reload(&mut self) -> Result<Option<Config>> {
        let mut changed = false;
        loop {
            match self.event_rx.try_recv() {
                Ok(Ok(event)) => {
                    if self.is_config_file_event(&event) {
                        debug!("Config file change detected: {:?}", event.kind);
                        changed = true;
                    }
                }
                Ok(Err(e)) => error!("File watch error: {}", e),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("File watch channel disconnected");
                    self.is_watching.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        if !changed {
            return Ok(None);
        }

        match self.reload_config() {
            Ok(config) => {
                info!("Configuration reloaded from {}", self.config_path.display());
                Ok(Some(config))
            }
            Err(e) => {
                warn!("Failed to reload configuration, keeping previous: {}", e);
                Err(e)
            }
        }
    }

    fn is_config_file_event(&self, event: &Event) -> bool {
        let target = self.config_path.canonicalize().ok();
        event.paths.iter().any(|p| {
            if p == &self.config_path {
                return true;
            }
            match (&target, p.canonicalize()) {
                (Some(target), Ok(candidate)) => &candidate == target,
                _ => p.file_name() == self.config_path.file_name(),
            }
        })
    }

    /// Re-read, parse and validate the watched file
    pub fn reload_config(&mut self) -> Result<Config> {
        std::thread::sleep(SETTLE_DELAY);

        let format = ConfigFormat::from_path(&self.config_path);
        let config = self.loader.load_config_file(&self.config_path, format)?;
        self.loader.validate_config(&config)?;

        *self.lock_config() = config.clone();
        Ok(config)
    }

    /// Poll for changes on a background task and hand each reload to `update_callback`
    pub fn start_background_watch(
        config_path: PathBuf,
        initial_config: Config,
        update_callback: impl Fn(Config) + Send + 'static,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let mut watcher = Self::new(config_path.clone(), initial_config)?;

        let handle = tokio::spawn(async move {
            info!(
                "Background config watcher started for: {}",
                config_path.display()
            );

            loop {
                if let Ok(Some(config)) = watcher.check_and_reload() {
                    update_callback(config);
                }

                if !watcher.is_watching() {
                    warn!("Config watcher stopped");
                    break;
                }

                sleep(POLL_INTERVAL).await;
            }
        });

        Ok(handle)
    }

    pub fn stop(&mut self) {
        self.is_watching.store(false, Ordering::SeqCst);
    }

    pub fn is_watching(&self) -> bool {
        self.is_watching.load(Ordering::SeqCst)
    }
}
