//! In-memory transport driven by a script, for tests.
//!
//! Each call to [`Connector::open`] consumes the next queued [`Plan`]. When
//! the queue is empty the session opens but never confirms (`Plan::Hang`),
//! which is what a dead endpoint looks like to the controller.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use botfleet_core::TransportError;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ConnectRequest, Connector, TransportEvent, TransportSession, TransportSink};

const EVENT_BUFFER: usize = 1024;

/// What the next `open` call does.
#[derive(Clone, Debug)]
pub enum Plan {
    /// `open` itself fails.
    Fail(TransportError),
    /// Session opens; nothing is ever emitted.
    Hang,
    /// Session opens and emits these events, then stays open.
    Events(Vec<TransportEvent>),
}

#[derive(Default)]
struct ScriptState {
    plans: VecDeque<Plan>,
    opened: Vec<ConnectRequest>,
    sent: Vec<String>,
    closes: usize,
    send_error: Option<TransportError>,
    /// One slot per opened session; `None` once closed.
    live: Vec<Option<mpsc::Sender<TransportEvent>>>,
}

/// Scripted [`Connector`]. Clones share the same script and recordings.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    /// Empty script: every attempt hangs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plan.
    pub fn push(&self, plan: Plan) {
        self.state.lock().plans.push_back(plan);
    }

    /// Queue a session that connects immediately.
    pub fn connect_ok(&self) {
        self.push(Plan::Events(vec![TransportEvent::Connected]));
    }

    /// Queue an `open` failure.
    pub fn fail(&self, err: TransportError) {
        self.push(Plan::Fail(err));
    }

    /// Emit an event on the most recently opened session.
    ///
    /// Returns `false` if no session is open or its receiver is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let tx = self.state.lock().live.last().cloned().flatten();
        tx.is_some_and(|tx| tx.try_send(event).is_ok())
    }

    /// Make every subsequent `send` fail with `err`.
    pub fn fail_sends(&self, err: TransportError) {
        self.state.lock().send_error = Some(err);
    }

    /// Hosts of every attempt, in order.
    pub fn hosts(&self) -> Vec<String> {
        self.state.lock().opened.iter().map(|r| r.host.clone()).collect()
    }

    /// Number of `open` calls.
    pub fn attempts(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Messages successfully sent, across all sessions.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<TransportSession, TransportError> {
        let plan = {
            let mut state = self.state.lock();
            state.opened.push(request.clone());
            state.plans.pop_front().unwrap_or(Plan::Hang)
        };
        let events = match plan {
            Plan::Fail(err) => return Err(err),
            Plan::Hang => Vec::new(),
            Plan::Events(events) => events,
        };
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        for event in events {
            let _ = tx.try_send(event);
        }
        let session = {
            let mut state = self.state.lock();
            state.live.push(Some(tx));
            state.live.len() - 1
        };
        Ok(TransportSession {
            events: rx,
            sink: Arc::new(ScriptedSink {
                state: Arc::clone(&self.state),
                session,
            }),
        })
    }
}

struct ScriptedSink {
    state: Arc<Mutex<ScriptState>>,
    session: usize,
}

#[async_trait]
impl TransportSink for ScriptedSink {
    async fn send(&self, message: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }
        state.sent.push(message.to_owned());
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closes += 1;
        if let Some(slot) = state.live.get_mut(self.session) {
            *slot = None;
        }
    }
}
