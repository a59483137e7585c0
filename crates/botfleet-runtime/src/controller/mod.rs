//! Instance lifecycle controller.
//!
//! One [`InstanceController`] per managed bot. `start` spawns a run loop
//! that walks the state machine:
//!
//! ```text
//! Idle ──start──▶ Connecting ──connected──▶ Connected
//!                    │  ▲                       │ disconnected / terminated / kicked
//!        error/timeout│  │ delay elapsed         ▼
//!                    ▼  │                  Disconnected
//!                 Reconnecting ◀────────────────┘
//!                    │ retries exhausted or disabled
//!                    ▼
//!                  Failed
//! ```
//!
//! `stop` cancels the loop from any state, closes the transport, and
//! unregisters the instance from the hub.

mod run;
mod state;

use std::sync::Arc;
use std::time::Duration;

use botfleet_core::InstanceId;
use botfleet_hub::{BroadcastHub, HubError};
use botfleet_settings::BotSettings;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub use state::{InstanceSnapshot, InstanceState};

use self::run::{Command, Runner, Shared};
use crate::behaviors::AutoReplies;
use crate::errors::{ControllerError, Result};
use crate::rotation::HostRotation;
use crate::transport::Connector;

const COMMAND_QUEUE: usize = 32;
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the lifecycle of one instance.
pub struct InstanceController {
    id: InstanceId,
    bot: Arc<BotSettings>,
    meta: Map<String, Value>,
    connector: Arc<dyn Connector>,
    hub: Arc<BroadcastHub>,
    replies: AutoReplies,
    shared: Arc<Mutex<Shared>>,
    run: tokio::sync::Mutex<Option<RunHandle>>,
}

impl InstanceController {
    /// Register `id` with the hub and return an idle controller.
    ///
    /// Fails if a controller for `id` is already registered.
    pub fn new(
        id: InstanceId,
        bot: BotSettings,
        meta: Map<String, Value>,
        hub: Arc<BroadcastHub>,
        connector: Arc<dyn Connector>,
    ) -> std::result::Result<Self, HubError> {
        hub.register_instance(id.clone(), meta.clone())?;
        let replies = AutoReplies::compile(&bot.auto_replies);
        let shared = Shared {
            state: InstanceState::Idle,
            retry_count: 0,
            endpoint: bot.host.clone(),
            generation: 0,
            commands: None,
        };
        Ok(Self {
            id,
            bot: Arc::new(bot),
            meta,
            connector,
            hub,
            replies,
            shared: Arc::new(Mutex::new(shared)),
            run: tokio::sync::Mutex::new(None),
        })
    }

    /// Instance id.
    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Settings this controller was built from.
    pub fn settings(&self) -> &BotSettings {
        &self.bot
    }

    /// Current state.
    pub fn state(&self) -> InstanceState {
        self.shared.lock().state
    }

    /// Current state, retry count and endpoint.
    pub fn snapshot(&self) -> InstanceSnapshot {
        let shared = self.shared.lock();
        InstanceSnapshot {
            id: self.id.clone(),
            state: shared.state,
            retry_count: shared.retry_count,
            endpoint: shared.endpoint.clone(),
        }
    }

    /// Begin connecting. Returns `false` if a run is already active.
    ///
    /// From `Failed` or `Idle` this resets the retry count, re-registers with
    /// the hub if `stop` removed it, and starts over at the primary endpoint.
    pub async fn start(&self) -> bool {
        let mut run = self.run.lock().await;
        let state = self.state();
        if state.is_running() {
            debug!(instance_id = %self.id, %state, "start ignored; already running");
            return false;
        }
        if let Some(finished) = run.take() {
            finished.cancel.cancel();
            if let Err(e) = finished.task.await {
                warn!(instance_id = %self.id, error = %e, "previous run ended abnormally");
            }
        }
        if !self.hub.contains(&self.id) {
            if let Err(e) = self.hub.register_instance(self.id.clone(), self.meta.clone()) {
                debug!(instance_id = %self.id, error = %e, "re-register skipped");
            }
        }

        let Some(rotation) = HostRotation::from_list(self.bot.endpoints()) else {
            error!(instance_id = %self.id, "no endpoints configured; not starting");
            return false;
        };
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let cancel = CancellationToken::new();
        let generation = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.state = InstanceState::Connecting;
            shared.retry_count = 0;
            shared.endpoint = rotation.current().to_owned();
            shared.commands = Some(tx);
            shared.generation
        };

        let runner = Runner {
            id: self.id.clone(),
            bot: Arc::clone(&self.bot),
            connector: Arc::clone(&self.connector),
            hub: Arc::clone(&self.hub),
            shared: Arc::clone(&self.shared),
            generation,
            cancel: cancel.clone(),
            commands: rx,
            rotation,
            replies: self.replies.clone(),
        };
        let span = info_span!("instance", instance_id = %self.id);
        let task = tokio::spawn(runner.run().instrument(span));
        *run = Some(RunHandle { cancel, task });
        info!(instance_id = %self.id, "instance started");
        true
    }

    /// Stop from any state: cancel timers and in-flight attempts, close the
    /// transport, unregister from the hub, and return to `Idle`.
    ///
    /// Only errors if the run loop panicked; the instance is stopped either way.
    /// Holds the run lock until the instance is unregistered, so a concurrent
    /// `start` lands either before or after the whole stop.
    pub async fn stop(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        let handle = run.take();
        {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.state = InstanceState::Idle;
            shared.commands = None;
        }

        let mut result = Ok(());
        if let Some(RunHandle { cancel, mut task }) = handle {
            cancel.cancel();
            match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(instance_id = %self.id, error = %e, "run loop failed");
                    result = Err(ControllerError::TaskFailed(e.to_string()));
                }
                Err(_) => {
                    warn!(instance_id = %self.id, "run loop did not stop in time; aborting");
                    task.abort();
                }
            }
        }

        let _ = self.hub.unregister_instance(&self.id);
        drop(run);
        info!(instance_id = %self.id, "instance stopped");
        result
    }

    /// Send one message over the live session.
    ///
    /// Fails with [`ControllerError::NotConnected`] without touching the
    /// transport unless the instance is `Connected`.
    pub async fn send(&self, message: &str) -> Result<()> {
        let commands = {
            let shared = self.shared.lock();
            if shared.state != InstanceState::Connected {
                return Err(ControllerError::NotConnected);
            }
            shared.commands.clone()
        };
        let commands = commands.ok_or(ControllerError::NotConnected)?;
        let (reply, response) = oneshot::channel();
        commands
            .send(Command::Send {
                message: message.to_owned(),
                reply,
            })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        response.await.map_err(|_| ControllerError::Stopped)?
    }
}
