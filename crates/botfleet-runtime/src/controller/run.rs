//! The per-instance run loop.

use std::sync::Arc;
use std::time::Duration;

use botfleet_core::{InstanceId, TransportError, now_ms};
use botfleet_hub::BroadcastHub;
use botfleet_settings::BotSettings;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::state::InstanceState;
use crate::behaviors::{AutoReplies, greeting_now, spawn_announcements};
use crate::errors::{ControllerError, Result};
use crate::rotation::HostRotation;
use crate::transport::{ConnectRequest, Connector, TransportEvent, TransportSession, TransportSink};

/// Requests from the controller handle to its run loop.
pub(super) enum Command {
    Send {
        message: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

impl Command {
    fn reject(self) {
        let Self::Send { reply, .. } = self;
        let _ = reply.send(Err(ControllerError::NotConnected));
    }
}

/// State visible outside the run loop. `generation` fences writes from a run
/// that has been superseded by `stop` or a later `start`.
pub(super) struct Shared {
    pub(super) state: InstanceState,
    pub(super) retry_count: u32,
    pub(super) endpoint: String,
    pub(super) generation: u64,
    pub(super) commands: Option<mpsc::Sender<Command>>,
}

enum Attempt {
    Connected(TransportSession),
    Failed(TransportError),
    Cancelled,
}

enum Ended {
    Cancelled,
    /// Session lost; carries the last non-benign error seen while connected.
    Lost(Option<TransportError>),
}

pub(super) struct Runner {
    pub(super) id: InstanceId,
    pub(super) bot: Arc<BotSettings>,
    pub(super) connector: Arc<dyn Connector>,
    pub(super) hub: Arc<BroadcastHub>,
    pub(super) shared: Arc<Mutex<Shared>>,
    pub(super) generation: u64,
    pub(super) cancel: CancellationToken,
    pub(super) commands: mpsc::Receiver<Command>,
    pub(super) rotation: HostRotation,
    pub(super) replies: AutoReplies,
}

impl Runner {
    pub(super) async fn run(mut self) {
        loop {
            let failure = match self.connect().await {
                Attempt::Cancelled => return,
                Attempt::Failed(err) => {
                    warn!(
                        endpoint = %self.rotation.current(),
                        error_kind = err.error_kind(),
                        error = %err.message,
                        "connection attempt failed"
                    );
                    self.publish_status(false);
                    Some(err)
                }
                Attempt::Connected(session) => match self.monitor(session).await {
                    Ended::Cancelled => return,
                    Ended::Lost(err) => {
                        self.publish_status(false);
                        err
                    }
                },
            };
            if !self.reconnect(failure.as_ref()).await {
                return;
            }
        }
    }

    /// Open a session on the current endpoint and wait for `Connected`,
    /// bounded by the connect timeout.
    async fn connect(&mut self) -> Attempt {
        let endpoint = self.rotation.current().to_owned();
        self.update(|s| s.endpoint.clone_from(&endpoint));
        let _ = self.transition(InstanceState::Connecting);

        let request = ConnectRequest::for_bot(&self.bot, endpoint.as_str());
        let timeout_ms = self.bot.connect_timeout_ms;
        info!(endpoint = %endpoint, port = request.port, "connecting");

        let connector = Arc::clone(&self.connector);
        let attempt = async move {
            let mut session = connector.open(&request).await?;
            await_connected(&mut session.events).await?;
            Ok::<_, TransportError>(session)
        };
        tokio::pin!(attempt);
        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Attempt::Cancelled,
                Some(cmd) = self.commands.recv() => cmd.reject(),
                result = &mut attempt => {
                    return match result {
                        Ok(session) => Attempt::Connected(session),
                        Err(err) => Attempt::Failed(err),
                    };
                }
                () = &mut deadline => {
                    return Attempt::Failed(TransportError::connect_timeout(timeout_ms));
                }
            }
        }
    }

    /// Serve a live session until it ends or the run is cancelled.
    async fn monitor(&mut self, session: TransportSession) -> Ended {
        let TransportSession { mut events, sink } = session;
        self.update(|s| s.retry_count = 0);
        let _ = self.transition(InstanceState::Connected);
        self.publish_status(true);
        info!(endpoint = %self.rotation.current(), "connected");

        if let Some(greeting) = &self.bot.greeting {
            if let Err(e) = sink.send(&greeting_now(greeting)).await {
                warn!(error = %e, "greeting failed");
            }
        }
        let behaviors = self.cancel.child_token();
        let announcements = spawn_announcements(&self.bot.announcements, &sink, &behaviors);

        let mut last_error: Option<TransportError> = None;
        let ended = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ended::Cancelled,
                Some(cmd) = self.commands.recv() => {
                    let Command::Send { message, reply } = cmd;
                    let result = sink.send(&message).await.map_err(ControllerError::from);
                    let _ = reply.send(result);
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Message(text)) => self.on_message(&sink, text).await,
                    Some(TransportEvent::Connected) => debug!("duplicate connected event ignored"),
                    Some(TransportEvent::Error(err)) => {
                        if err.is_benign() {
                            debug!(error_kind = err.error_kind(), error = %err.message, "ignoring transport noise");
                        } else {
                            warn!(error_kind = err.error_kind(), error = %err.message, "transport error");
                            last_error = Some(err);
                        }
                    }
                    Some(TransportEvent::Disconnected(reason)) => {
                        warn!(%reason, "disconnected");
                        break Ended::Lost(last_error.take());
                    }
                    Some(TransportEvent::Terminated(reason)) => {
                        warn!(%reason, "session terminated");
                        break Ended::Lost(last_error.take());
                    }
                    Some(TransportEvent::Kicked(reason)) => {
                        warn!(%reason, "kicked");
                        break Ended::Lost(last_error.take());
                    }
                    None => {
                        warn!("transport event stream ended");
                        break Ended::Lost(last_error.take());
                    }
                },
            }
        };

        behaviors.cancel();
        for task in announcements {
            let _ = task.await;
        }
        sink.close().await;
        if matches!(ended, Ended::Lost(_)) {
            let _ = self.transition(InstanceState::Disconnected);
        }
        ended
    }

    async fn on_message(&self, sink: &Arc<dyn TransportSink>, text: String) {
        if self.cancel.is_cancelled() {
            return;
        }
        let reply = self.replies.reply_for(&text);
        let _ = self.hub.publish_log(&self.id, text, now_ms());
        if let Some(reply) = reply {
            match sink.send(&reply).await {
                Ok(()) => debug!(%reply, "auto-reply sent"),
                Err(e) => warn!(error = %e, "auto-reply failed"),
            }
        }
    }

    /// Enter `Reconnecting` and either wait out the delay (`true`) or give
    /// up (`false`, in `Failed` or cancelled).
    async fn reconnect(&mut self, failure: Option<&TransportError>) -> bool {
        if !self.transition(InstanceState::Reconnecting) {
            return false;
        }
        let policy = self.bot.reconnect.clone();
        let retry = self.shared.lock().retry_count;

        if !policy.enabled || retry >= policy.max_retries {
            let _ = self.transition(InstanceState::Failed);
            self.publish_status(false);
            error!(
                retries = retry,
                max_retries = policy.max_retries,
                reconnect_enabled = policy.enabled,
                "instance failed; no further automatic retries"
            );
            return false;
        }

        let retry = retry + 1;
        self.update(|s| s.retry_count = retry);
        if failure.is_some_and(TransportError::is_endpoint_class) {
            let next = self.rotation.advance().to_owned();
            info!(endpoint = %next, "rotating endpoint");
            self.update(|s| s.endpoint = next);
        }
        info!(
            retry,
            max_retries = policy.max_retries,
            delay_ms = policy.delay_ms,
            "scheduling reconnect"
        );

        let delay = tokio::time::sleep(Duration::from_millis(policy.delay_ms));
        tokio::pin!(delay);
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                Some(cmd) = self.commands.recv() => cmd.reject(),
                () = &mut delay => return true,
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut Shared)) -> bool {
        let mut shared = self.shared.lock();
        if shared.generation != self.generation {
            return false;
        }
        f(&mut shared);
        true
    }

    fn transition(&self, next: InstanceState) -> bool {
        let mut prev = next;
        let current = self.update(|s| {
            prev = s.state;
            s.state = next;
        });
        if current && prev != next {
            info!(from = %prev, to = %next, "state transition");
        }
        current
    }

    fn publish_status(&self, connected: bool) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.hub.publish_status(&self.id, connected);
    }
}

/// Wait for `Connected`, skipping benign noise. Anything that ends the
/// session first is a failure.
async fn await_connected(
    events: &mut mpsc::Receiver<TransportEvent>,
) -> std::result::Result<(), TransportError> {
    loop {
        match events.recv().await {
            Some(TransportEvent::Connected) => return Ok(()),
            Some(TransportEvent::Error(err)) if err.is_benign() => {
                debug!(error_kind = err.error_kind(), error = %err.message, "ignoring transport noise while connecting");
            }
            Some(TransportEvent::Error(err)) => return Err(err),
            Some(TransportEvent::Message(text)) => trace!(%text, "message before connected"),
            Some(
                TransportEvent::Disconnected(reason)
                | TransportEvent::Terminated(reason)
                | TransportEvent::Kicked(reason),
            ) => return Err(TransportError::closed(reason)),
            None => return Err(TransportError::closed("transport ended before connecting")),
        }
    }
}
