//! Sequence Runner
//!
//! Owns the session-wide stores and allows one run at a time. Starting a run
//! first cancels and joins the previous one, then gives the new run a fresh
//! response queue and cancellation token.
//!
//! Each run is supervised by a task that publishes its [`RunOutcome`] on a
//! watch channel. Any number of callers can await that outcome while the run
//! stays registered as the active one.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventBus, SequenceEvent};
use crate::executor::{
    CancellationToken, ExecutionContext, ExecutionSettings, ExecutorState, ResponseQueue,
    ResponseRouter, RunOutcome, SequenceExecutor,
};
use crate::flags::FlagStore;
use crate::link::DeviceLink;
use crate::resolver::SequenceResolver;
use crate::signals::SignalRegistry;
use crate::zones::ZoneRegistry;

/// Handle on the most recent run; the outcome is published once it is known
#[derive(Clone)]
struct ActiveRun {
    run_id: Uuid,
    token: CancellationToken,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl ActiveRun {
    fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    async fn outcome(mut self) -> RunOutcome {
        let published = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone());
        match published {
            Some(outcome) => outcome,
            // The supervising task itself went away (runtime shutdown)
            None => aborted_outcome(
                self.run_id,
                None,
                Utc::now(),
                "run supervisor stopped".to_string(),
            ),
        }
    }
}

pub struct SequenceRunner {
    resolver: Arc<SequenceResolver>,
    context: ExecutionContext,
    router: Arc<ResponseRouter>,
    signals: Arc<SignalRegistry>,
    settings: ExecutionSettings,
    /// Serialises starts so each one sees and replaces the previous run
    start_lock: Mutex<()>,
    active: StdMutex<Option<ActiveRun>>,
}

impl SequenceRunner {
    pub fn new(
        resolver: Arc<SequenceResolver>,
        context: ExecutionContext,
        router: Arc<ResponseRouter>,
        settings: ExecutionSettings,
    ) -> Self {
        let signals = Arc::new(SignalRegistry::with_flags(Arc::clone(&context.flags)));
        router.set_signals(Arc::clone(&signals));
        Self {
            resolver,
            context,
            router,
            signals,
            settings,
            start_lock: Mutex::new(()),
            active: StdMutex::new(None),
        }
    }

    /// Build every store from a loaded configuration
    ///
    /// The router must be the one the link pushes device lines into; its event
    /// bus becomes the runner's.
    pub fn from_config(
        config: &Config,
        link: Arc<dyn DeviceLink>,
        router: Arc<ResponseRouter>,
    ) -> Result<Self> {
        let flags = Arc::new(FlagStore::new());
        flags.load_from(&config.flags);

        let zones = Arc::new(ZoneRegistry::new());
        if !config.zones.active.is_empty() {
            zones.try_set_zones(&config.zones.active)?;
        }

        let context = ExecutionContext {
            link,
            flags,
            zones,
            events: router.events().clone(),
        };
        let runner = Self::new(
            Arc::new(SequenceResolver::from_config(config)),
            context,
            router,
            ExecutionSettings::from_config(config),
        );
        runner.signals.load_config(&config.signals)?;
        Ok(runner)
    }

    pub fn resolver(&self) -> &Arc<SequenceResolver> {
        &self.resolver
    }

    pub fn flags(&self) -> &Arc<FlagStore> {
        &self.context.flags
    }

    pub fn zones(&self) -> &Arc<ZoneRegistry> {
        &self.context.zones
    }

    pub fn events(&self) -> &EventBus {
        &self.context.events
    }

    pub fn router(&self) -> &Arc<ResponseRouter> {
        &self.router
    }

    /// Device signal mappings; installed on the router at construction
    pub fn signals(&self) -> &Arc<SignalRegistry> {
        &self.signals
    }

    /// Write a flag and announce the change
    pub fn set_flag(&self, name: &str, value: bool) {
        self.context.flags.set(name, value);
        self.context.events.publish(SequenceEvent::FlagChanged {
            name: name.to_string(),
            value,
        });
    }

    /// Start the named sequence, replacing any active run
    pub async fn start(&self, name: &str) -> Result<Uuid> {
        Ok(self.launch_named(name).await?.run_id)
    }

    /// Start an already resolved directive list, replacing any active run
    pub async fn start_directives(&self, directives: Vec<String>) -> Result<Uuid> {
        Ok(self.spawn_run(directives, None).await?.run_id)
    }

    async fn launch_named(&self, name: &str) -> Result<ActiveRun> {
        if !self.resolver.contains(name) {
            return Err(Error::SequenceNotFound {
                name: name.to_string(),
            });
        }
        let directives = self.resolver.expand(name);
        self.spawn_run(directives, Some(name.to_string())).await
    }

    async fn spawn_run(
        &self,
        directives: Vec<String>,
        sequence: Option<String>,
    ) -> Result<ActiveRun> {
        let _starting = self.start_lock.lock().await;

        let previous = self.current();
        if let Some(previous) = previous.filter(|run| !run.is_finished()) {
            info!("Replacing active run {}", previous.run_id);
            previous.token.cancel();
            previous.outcome().await;
        }

        let queue = Arc::new(ResponseQueue::new(self.settings.response_queue_capacity));
        let token = CancellationToken::new();
        let mut executor = SequenceExecutor::new(
            directives,
            self.context.clone(),
            self.settings.clone(),
            Arc::clone(&queue),
            token.clone(),
        )?;
        if let Some(name) = &sequence {
            executor = executor.with_sequence_name(name.clone());
        }
        let run_id = executor.run_id();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let run = ActiveRun {
            run_id,
            token,
            outcome: outcome_rx,
        };

        self.router.attach(Arc::clone(&queue));
        *self.lock_active() = Some(run.clone());

        let router = Arc::clone(&self.router);
        let events = self.context.events.clone();
        let started_at = Utc::now();
        tokio::spawn(async move {
            let outcome = match tokio::spawn(executor.run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The executor could not report for itself
                    let message = Error::RunAborted {
                        reason: e.to_string(),
                    }
                    .to_string();
                    error!("Run {} {}", run_id, message);
                    events.publish(SequenceEvent::SequenceFinished {
                        run_id,
                        success: false,
                        message: message.clone(),
                    });
                    aborted_outcome(run_id, sequence, started_at, message)
                }
            };
            router.detach_if(&queue);
            outcome_tx.send_replace(Some(outcome));
        });

        Ok(run)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Option<ActiveRun> {
        self.lock_active().clone()
    }

    /// Request cancellation of the active run, if any
    pub fn cancel(&self) -> bool {
        match self.current().filter(|run| !run.is_finished()) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current().is_some_and(|run| !run.is_finished())
    }

    /// Wait for the most recent run to finish
    ///
    /// The run stays registered while it is awaited, so a concurrent start
    /// still cancels and joins it. Returns `None` before the first start.
    pub async fn wait(&self) -> Option<RunOutcome> {
        let run = self.current()?;
        Some(run.outcome().await)
    }

    /// Start `name` and wait for its own outcome
    pub async fn run(&self, name: &str) -> Result<RunOutcome> {
        let run = self.launch_named(name).await?;
        Ok(run.outcome().await)
    }
}

fn aborted_outcome(
    run_id: Uuid,
    sequence: Option<String>,
    started_at: DateTime<Utc>,
    message: String,
) -> RunOutcome {
    RunOutcome {
        run_id,
        sequence,
        state: ExecutorState::Failed,
        success: false,
        message,
        directives_total: 0,
        commands_sent: 0,
        started_at,
        finished_at: Utc::now(),
    }
}
