//! In-process link backed by a channel
//!
//! Commands written to a [`ChannelLink`] arrive on the paired receiver. Paired
//! with [`spawn_simulated_device`] it stands in for hardware in dry runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::DeviceLink;
use crate::executor::ResponseRouter;

#[derive(Debug)]
pub struct ChannelLink {
    commands: mpsc::UnboundedSender<String>,
    connected: AtomicBool,
}

impl ChannelLink {
    /// Link plus the receiver that sees every command sent through it
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                commands,
                connected: AtomicBool::new(true),
            },
            rx,
        )
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceLink for ChannelLink {
    async fn send_command(&self, command: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.commands.send(command.to_string()).is_ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.commands.is_closed()
    }
}

/// Answer every received command with the lines `respond` returns
///
/// Each reply is delayed by `latency` to mimic a real device.
pub fn spawn_simulated_device<F>(
    mut commands: mpsc::UnboundedReceiver<String>,
    router: Arc<ResponseRouter>,
    latency: Duration,
    respond: F,
) -> JoinHandle<()>
where
    F: Fn(&str) -> Vec<String> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            debug!("Simulated device got: {}", command);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            for line in respond(&command) {
                router.push(&line);
            }
        }
        debug!("Simulated device stopped");
    })
}
