//! Sequence Executor
//!
//! Runs one flat directive list against the device:
//!
//! 1. refuses empty lists, a disconnected link, and lists that fail validation,
//! 2. walks the directives with a conditional cursor,
//! 3. sends each active command and waits for the device to complete it,
//! 4. reports progress after every top-level directive and a single
//!    [`SequenceEvent::SequenceFinished`] at the end.
//!
//! Every failure is terminal for the run and surfaces as a [`RunOutcome`]; nothing
//! escapes the task unhandled.

pub mod cancellation;
pub mod conditional;
pub mod protocol;
pub mod response;

pub use cancellation::CancellationToken;
pub use conditional::ConditionalState;
pub use protocol::{ResponseKind, ResponseMatcher, SequenceKeywords};
pub use response::{ResponseQueue, ResponseRouter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::config::Config;
use crate::directive::{Directive, DirectiveClassifier};
use crate::error::{Error, Result};
use crate::events::{EventBus, SequenceEvent};
use crate::flags::FlagStore;
use crate::link::DeviceLink;
use crate::zones::{zone_select_command, ZoneRegistry, ZoneStatus};

/// Timing, keywords and limits for a run
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub command_timeout: Duration,
    pub zone_select_timeout: Duration,
    pub poll_interval: Duration,
    pub response_queue_capacity: usize,
    pub keywords: SequenceKeywords,
    pub classifier: DirectiveClassifier,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ExecutionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            command_timeout: config.execution.command_timeout(),
            zone_select_timeout: config.execution.zone_select_timeout(),
            poll_interval: config.execution.poll_interval(),
            response_queue_capacity: config.execution.response_queue_capacity,
            keywords: config.sequence_keywords.clone(),
            classifier: config.limits.classifier(),
        }
    }
}

/// Shared collaborators of every run
#[derive(Clone)]
pub struct ExecutionContext {
    pub link: Arc<dyn DeviceLink>,
    pub flags: Arc<FlagStore>,
    pub zones: Arc<ZoneRegistry>,
    pub events: EventBus,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("connected", &self.link.is_connected())
            .field("flags", &self.flags)
            .field("zones", &self.zones)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutorState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutorState::Completed | ExecutorState::Failed | ExecutorState::Cancelled
        )
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Running => "running",
            ExecutorState::Completed => "completed",
            ExecutorState::Failed => "failed",
            ExecutorState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal report of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub sequence: Option<String>,
    pub state: ExecutorState,
    pub success: bool,
    pub message: String,
    pub directives_total: usize,
    pub commands_sent: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.state == ExecutorState::Cancelled
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Executes one directive list; consumed by [`SequenceExecutor::run`]
pub struct SequenceExecutor {
    run_id: Uuid,
    sequence: Option<String>,
    directives: Vec<String>,
    context: ExecutionContext,
    settings: ExecutionSettings,
    matcher: ResponseMatcher,
    queue: Arc<ResponseQueue>,
    token: CancellationToken,
    state: ExecutorState,
    commands_sent: usize,
}

impl SequenceExecutor {
    pub fn new(
        directives: Vec<String>,
        context: ExecutionContext,
        settings: ExecutionSettings,
        queue: Arc<ResponseQueue>,
        token: CancellationToken,
    ) -> Result<Self> {
        let matcher = ResponseMatcher::new(&settings.keywords)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            sequence: None,
            directives,
            context,
            settings,
            matcher,
            queue,
            token,
            state: ExecutorState::Idle,
            commands_sent: 0,
        })
    }

    /// Label the run with the sequence name it was expanded from
    pub fn with_sequence_name(mut self, name: impl Into<String>) -> Self {
        self.sequence = Some(name.into());
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Execute to a terminal state
    pub async fn run(mut self) -> RunOutcome {
        let started_at = Utc::now();
        self.state = ExecutorState::Running;
        info!(
            "Run {} started: {} directive(s){}",
            self.run_id,
            self.directives.len(),
            self.sequence
                .as_deref()
                .map(|name| format!(" from '{}'", name))
                .unwrap_or_default()
        );

        let result = self.execute().await;
        let (state, message) = match result {
            Ok(count) => (
                ExecutorState::Completed,
                format!("sequence completed: {} directive(s)", count),
            ),
            Err(Error::Cancelled) => (ExecutorState::Cancelled, Error::Cancelled.to_string()),
            Err(e) => (ExecutorState::Failed, e.to_string()),
        };
        self.state = state;

        let success = state == ExecutorState::Completed;
        match state {
            ExecutorState::Completed => info!("Run {}: {}", self.run_id, message),
            ExecutorState::Cancelled => warn!("Run {}: {}", self.run_id, message),
            _ => error!("Run {} failed: {}", self.run_id, message),
        }
        self.context.events.publish(SequenceEvent::SequenceFinished {
            run_id: self.run_id,
            success,
            message: message.clone(),
        });

        RunOutcome {
            run_id: self.run_id,
            sequence: self.sequence,
            state,
            success,
            message,
            directives_total: self.directives.len(),
            commands_sent: self.commands_sent,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn parse(&self) -> Result<Vec<Directive>> {
        let classifier = &self.settings.classifier;
        let report = classifier.validate_sequence(&self.directives);
        if !report.is_valid {
            return Err(Error::SequenceValidationFailed {
                errors: report.errors,
            });
        }
        self.directives
            .iter()
            .map(|raw| {
                classifier
                    .classify(raw)
                    .map_err(|source| Error::DirectiveInvalid {
                        directive: raw.clone(),
                        source,
                    })
            })
            .collect()
    }

    async fn execute(&mut self) -> Result<usize> {
        if self.directives.is_empty() {
            return Err(Error::EmptySequence);
        }
        if !self.context.link.is_connected() {
            return Err(Error::DeviceNotConnected);
        }
        let parsed = self.parse()?;
        let total = parsed.len();
        let mut cursor = ConditionalState::new();

        for (index, directive) in parsed.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.step(directive, &mut cursor).await?;
            self.context.events.publish(SequenceEvent::ProgressUpdated {
                run_id: self.run_id,
                current: index + 1,
                total,
            });
        }

        Ok(total)
    }

    async fn step(&mut self, directive: &Directive, cursor: &mut ConditionalState) -> Result<()> {
        match directive {
            Directive::If { flag } => {
                let value = self.context.flags.get(flag);
                cursor.enter_if(value);
                debug!("if {} = {} (depth {})", flag, value, cursor.depth());
                self.context.events.publish(SequenceEvent::ConditionalEntered {
                    run_id: self.run_id,
                    flag: flag.clone(),
                    value,
                });
                Ok(())
            }
            Directive::Else => {
                cursor.enter_else()?;
                debug!("else (suppressed: {})", cursor.is_suppressed());
                Ok(())
            }
            Directive::EndIf => {
                cursor.exit_if()?;
                self.context.events.publish(SequenceEvent::ConditionalExited {
                    run_id: self.run_id,
                    depth: cursor.depth(),
                });
                Ok(())
            }
            // Checked even inside an inactive branch
            Directive::StopIfNot { flag } => {
                if self.context.flags.get(flag) {
                    Ok(())
                } else {
                    Err(Error::StoppedByFlag { flag: flag.clone() })
                }
            }
            other if cursor.is_suppressed() => {
                debug!("Skipping '{}' inside inactive branch", other);
                Ok(())
            }
            Directive::Wait { seconds } => {
                let duration = Duration::try_from_secs_f64(*seconds).unwrap_or(Duration::MAX);
                self.wait(duration).await
            }
            Directive::Regular { command } => {
                let timeout = self.settings.command_timeout;
                self.send_and_await(command, timeout).await
            }
            Directive::Multizone { base_command } => self.fan_out(base_command).await,
        }
    }

    /// Sleep in poll-sized slices so cancellation lands within one tick
    async fn wait(&self, duration: Duration) -> Result<()> {
        debug!("Waiting {:?}", duration);
        let deadline = deadline_after(duration);
        loop {
            if self.token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(tick) = self.next_tick(deadline) else {
                return Ok(());
            };
            tokio::select! {
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                _ = sleep(tick) => {}
            }
        }
    }

    /// Time to sleep before the next check, `None` once `deadline` has passed
    fn next_tick(&self, deadline: Option<Instant>) -> Option<Duration> {
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                (now < deadline).then(|| self.settings.poll_interval.min(deadline - now))
            }
            None => Some(self.settings.poll_interval),
        }
    }

    async fn fan_out(&mut self, base_command: &str) -> Result<()> {
        let zones = self.context.zones.get_active_zones();
        if zones.is_empty() {
            return Err(Error::NoActiveZones);
        }
        info!("Multizone '{}' over zones {:?}", base_command, zones);

        for zone in zones {
            if self.token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let previous = self.context.zones.get_zone_status(zone);
            self.set_zone_status(zone, ZoneStatus::Executing);
            match self.run_zone(zone, base_command).await {
                Ok(()) => self.set_zone_status(zone, ZoneStatus::Completed),
                Err(Error::Cancelled) => {
                    // An interrupted zone is not a failed one
                    if let Some(status) = previous {
                        self.set_zone_status(zone, status);
                    }
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    self.context.zones.mark_zone_error(zone, e.to_string());
                    self.context.events.publish(SequenceEvent::ZoneStatusUpdated {
                        zone,
                        status: ZoneStatus::Error,
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn run_zone(&mut self, zone: u8, base_command: &str) -> Result<()> {
        let select_timeout = self.settings.zone_select_timeout;
        self.send_and_await(&zone_select_command(zone), select_timeout)
            .await?;
        let timeout = self.settings.command_timeout;
        self.send_and_await(base_command, timeout).await
    }

    fn set_zone_status(&self, zone: u8, status: ZoneStatus) {
        self.context.zones.set_zone_status(zone, status);
        self.context
            .events
            .publish(SequenceEvent::ZoneStatusUpdated { zone, status });
    }

    /// Write `command` and wait for a completion line, an error line, or the timeout
    async fn send_and_await(&mut self, command: &str, timeout: Duration) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let stale = self.queue.clear();
        if stale > 0 {
            debug!("Discarded {} stale response(s)", stale);
        }

        if !self.context.link.is_connected() {
            return Err(Error::DeviceNotConnected);
        }
        if !self.context.link.send_command(command).await {
            return Err(Error::DeviceWriteFailed {
                command: command.to_string(),
            });
        }
        self.commands_sent += 1;
        info!("Sent: {}", command);
        self.context.events.publish(SequenceEvent::CommandSent {
            run_id: self.run_id,
            command: command.to_string(),
        });

        let deadline = deadline_after(timeout);
        loop {
            if self.token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            while let Some(line) = self.queue.pop() {
                match self.matcher.classify(&line) {
                    ResponseKind::Completed => {
                        debug!("'{}' completed", command);
                        return Ok(());
                    }
                    ResponseKind::Error => {
                        return Err(Error::DeviceReportedError {
                            command: command.to_string(),
                            response: line.trim().to_string(),
                        });
                    }
                    ResponseKind::Received => debug!("'{}' acknowledged", command),
                    ResponseKind::Progress | ResponseKind::Other => {
                        debug!("'{}' response: {}", command, line)
                    }
                }
            }

            let Some(tick) = self.next_tick(deadline) else {
                return Err(Error::CommandTimeout {
                    command: command.to_string(),
                    duration: timeout,
                });
            };
            tokio::select! {
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                _ = self.queue.notified() => {}
                _ = sleep(tick) => {}
            }
        }
    }
}

/// `None` when the deadline lies beyond what the clock can represent
fn deadline_after(duration: Duration) -> Option<Instant> {
    Instant::now().checked_add(duration)
}
