//! Sequence Event System
//!
//! Runs report what they do through a broadcast bus. Monitoring code subscribes
//! and receives every event published after it subscribed.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::zones::ZoneStatus;

/// Events produced by the execution engine
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceEvent {
    /// A top-level directive finished
    ProgressUpdated {
        run_id: Uuid,
        /// 1-based index of the directive just processed
        current: usize,
        total: usize,
    },
    /// A command was written to the device
    CommandSent { run_id: Uuid, command: String },
    /// The device produced a line
    ResponseReceived { line: String },
    /// A run reached a terminal state
    SequenceFinished {
        run_id: Uuid,
        success: bool,
        message: String,
    },
    /// A zone changed status during fan-out
    ZoneStatusUpdated { zone: u8, status: ZoneStatus },
    /// A flag was written through the runner
    FlagChanged { name: String, value: bool },
    /// An `if` was evaluated
    ConditionalEntered {
        run_id: Uuid,
        flag: String,
        value: bool,
    },
    /// A device signal line updated a variable
    SignalUpdated {
        signal: String,
        variable: String,
        value: serde_json::Value,
    },
    /// An `endif` closed a block
    ConditionalExited { run_id: Uuid, depth: usize },
}

/// Subscription handle for receiving sequence events
pub struct EventSubscription {
    receiver: broadcast::Receiver<SequenceEvent>,
}

impl EventSubscription {
    /// Receive the next event, waiting if necessary
    pub async fn recv(&mut self) -> Option<SequenceEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Event subscriber lagged by {} events", count);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<SequenceEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!("Event subscriber lagged by {} events", count);
                }
            }
        }
    }

    /// Every event already queued for this subscriber
    pub fn drain(&mut self) -> Vec<SequenceEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Event bus for publishing and subscribing to sequence events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SequenceEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SequenceEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
