//! Mock Device Link for Testing
//!
//! Records every command written to it and answers from a script. Replies are
//! pushed straight into the [`ResponseRouter`] the way a link reader would.

use async_trait::async_trait;
use linkseq::executor::ResponseRouter;
use linkseq::link::DeviceLink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SendHook = Box<dyn Fn(&str) + Send + Sync>;

/// Scripted device
pub struct MockLink {
    router: Arc<ResponseRouter>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    default_reply: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    latency: Duration,
    on_send: Mutex<Option<SendHook>>,
}

impl MockLink {
    /// Create a mock that answers every command with `RECEIVED` then `complete`
    pub fn new(router: Arc<ResponseRouter>) -> Self {
        Self {
            router,
            replies: Mutex::new(HashMap::new()),
            default_reply: Mutex::new(vec!["RECEIVED".to_string(), "complete".to_string()]),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            latency: Duration::ZERO,
            on_send: Mutex::new(None),
        }
    }

    /// Deliver replies after `latency` from a spawned task
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer `command` with `lines`; an empty list means silence
    pub fn reply_to(&self, command: &str, lines: &[&str]) {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            lines.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Answer commands without a script entry with `lines`
    pub fn set_default_reply(&self, lines: &[&str]) {
        *self.default_reply.lock().unwrap() = lines.iter().map(|s| s.to_string()).collect();
    }

    /// Commands written so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Run `hook` for every accepted command, before its replies are delivered
    pub fn on_send(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn reply_for(&self, command: &str) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| self.default_reply.lock().unwrap().clone())
    }
}

#[async_trait]
impl DeviceLink for MockLink {
    async fn send_command(&self, command: &str) -> bool {
        if !self.is_connected() || self.fail_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(command.to_string());
        if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
            hook(command);
        }

        let lines = self.reply_for(command);
        if self.latency.is_zero() {
            for line in &lines {
                self.router.push(line);
            }
        } else {
            let router = Arc::clone(&self.router);
            let latency = self.latency;
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                for line in &lines {
                    router.push(line);
                }
            });
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkseq::events::EventBus;
    use linkseq::executor::ResponseQueue;

    fn attached() -> (MockLink, Arc<ResponseQueue>) {
        let router = Arc::new(ResponseRouter::new(EventBus::default()));
        let queue = Arc::new(ResponseQueue::default());
        router.attach(Arc::clone(&queue));
        (MockLink::new(router), queue)
    }

    #[tokio::test]
    async fn test_default_reply_reaches_queue() {
        let (link, queue) = attached();
        assert!(link.send_command("home").await);
        assert_eq!(queue.pop().as_deref(), Some("RECEIVED"));
        assert_eq!(queue.pop().as_deref(), Some("complete"));
        assert_eq!(link.sent(), vec!["home"]);
    }

    #[tokio::test]
    async fn test_scripted_reply_overrides_default() {
        let (link, queue) = attached();
        link.reply_to("G29", &["error: no sensor"]);
        link.send_command("G29").await;
        assert_eq!(queue.pop().as_deref(), Some("error: no sensor"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_send_hook_sees_each_command() {
        let (link, _queue) = attached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        link.on_send(move |command| recorder.lock().unwrap().push(command.to_string()));

        link.send_command("G28").await;
        link.send_command("G1 E10").await;
        assert_eq!(*seen.lock().unwrap(), vec!["G28", "G1 E10"]);
    }

    #[tokio::test]
    async fn test_write_failures() {
        let (link, _queue) = attached();
        link.set_fail_writes(true);
        assert!(!link.send_command("home").await);
        link.set_fail_writes(false);
        link.set_connected(false);
        assert!(!link.send_command("home").await);
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_latency_delays_replies() {
        let (link, queue) = attached();
        let link = link.with_latency(Duration::from_millis(20));
        link.send_command("home").await;
        assert!(queue.is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.len(), 2);
    }
}
