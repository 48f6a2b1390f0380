//! Response buffering between the device link and the active run
//!
//! The link's reader hands every decoded line to the [`ResponseRouter`], which
//! publishes it and forwards it to the [`ResponseQueue`] of the run currently
//! attached. Lines arriving while no run is attached are only published.
//! Lines naming a registered device signal also update its variable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::events::{EventBus, SequenceEvent};
use crate::signals::SignalRegistry;

/// Default number of lines a queue holds before dropping the oldest
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Bounded FIFO of response lines for one run
#[derive(Debug)]
pub struct ResponseQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    total: AtomicU64,
    notify: Notify,
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ResponseQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            total: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a line, dropping the oldest when full
    pub fn push(&self, line: impl Into<String>) {
        {
            let mut lines = self.lock();
            if lines.len() >= self.capacity {
                if let Some(dropped) = lines.pop_front() {
                    warn!("Response queue full, dropping '{}'", dropped);
                }
            }
            lines.push_back(line.into());
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    /// Discard everything buffered
    pub fn clear(&self) -> usize {
        let mut lines = self.lock();
        let discarded = lines.len();
        lines.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Lines pushed since creation, including dropped and cleared ones
    pub fn total_received(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Resolves after the next push (or immediately if one is pending)
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Fans device lines out to the event bus and the attached run
#[derive(Debug)]
pub struct ResponseRouter {
    active: Mutex<Option<Arc<ResponseQueue>>>,
    signals: Mutex<Option<Arc<SignalRegistry>>>,
    events: EventBus,
}

impl ResponseRouter {
    pub fn new(events: EventBus) -> Self {
        Self {
            active: Mutex::new(None),
            signals: Mutex::new(None),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ResponseQueue>>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Route subsequent lines to `queue`
    pub fn attach(&self, queue: Arc<ResponseQueue>) {
        *self.lock() = Some(queue);
    }

    /// Stop routing lines to any run
    pub fn detach(&self) {
        *self.lock() = None;
    }

    /// Detach only if `queue` is still the attached one
    pub fn detach_if(&self, queue: &Arc<ResponseQueue>) -> bool {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, queue)) {
            *active = None;
            true
        } else {
            false
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Interpret subsequent `NAME:VALUE` lines with `signals`
    pub fn set_signals(&self, signals: Arc<SignalRegistry>) {
        *self.signals.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(signals);
    }

    pub fn signals(&self) -> Option<Arc<SignalRegistry>> {
        self.signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Called by the link for every line the device sends
    pub fn push(&self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        debug!("Response: {}", line);
        self.events.publish(SequenceEvent::ResponseReceived {
            line: line.to_string(),
        });
        let queue = self.lock().clone();
        match queue {
            Some(queue) => queue.push(line),
            None => debug!("No active run, response not queued"),
        }

        if let Some(Ok(signal)) = self.signals().and_then(|signals| signals.process_line(line)) {
            if let Some(value) = signal.as_flag() {
                self.events.publish(SequenceEvent::FlagChanged {
                    name: signal.variable_name.clone(),
                    value,
                });
            }
            self.events.publish(SequenceEvent::SignalUpdated {
                signal: signal.signal_name,
                variable: signal.variable_name,
                value: signal.value,
            });
        }
    }
}
