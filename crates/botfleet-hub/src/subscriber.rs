//! Subscriber mailboxes and the handle returned by `subscribe`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use botfleet_core::{InstanceId, SubscriberId};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::frame::Frame;
use crate::hub::InstanceChannel;

/// Result of pushing one frame into a mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Queue full; the frame was discarded. `total` counts every drop so far.
    Dropped { total: u64 },
    Closed,
}

struct MailboxState {
    queue: VecDeque<Frame>,
    closed: bool,
    dropped: u64,
}

/// Bounded single-consumer queue for one subscriber.
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue without blocking.
    ///
    /// Log frames are dropped when the queue is full. A status frame replaces
    /// a status at the back of the queue; a status behind other frames stays
    /// put so publication order is preserved.
    pub(crate) fn push(&self, frame: Frame) -> Delivery {
        let mut state = self.state.lock();
        if state.closed {
            return Delivery::Closed;
        }
        if frame.is_status() {
            if state.queue.back().is_some_and(Frame::is_status) {
                let _ = state.queue.pop_back();
            }
        } else if frame.is_log() && state.queue.len() >= self.capacity {
            state.dropped += 1;
            return Delivery::Dropped {
                total: state.dropped,
            };
        }
        state.queue.push_back(frame);
        drop(state);
        self.notify.notify_one();
        Delivery::Queued
    }

    /// Stop accepting frames. Already queued frames can still be received.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Frame> {
        self.state.lock().queue.pop_front()
    }

    pub(crate) async fn recv(&self) -> Option<Frame> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(frame) = state.queue.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// A live subscription to one instance's event stream.
///
/// Dropping the handle unsubscribes it.
pub struct SubscriberHandle {
    id: SubscriberId,
    instance_id: InstanceId,
    mailbox: Arc<Mailbox>,
    channel: Weak<InstanceChannel>,
    released: AtomicBool,
}

impl SubscriberHandle {
    pub(crate) fn new(
        id: SubscriberId,
        instance_id: InstanceId,
        mailbox: Arc<Mailbox>,
        channel: Weak<InstanceChannel>,
    ) -> Self {
        Self {
            id,
            instance_id,
            mailbox,
            channel,
            released: AtomicBool::new(false),
        }
    }

    /// This subscriber's id.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// The instance this subscriber is bound to.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Wait for the next frame. Returns `None` once the subscription is
    /// closed and drained (unsubscribed, evicted, or instance unregistered).
    pub async fn recv(&self) -> Option<Frame> {
        self.mailbox.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&self) -> Option<Frame> {
        self.mailbox.try_pop()
    }

    /// Log frames dropped because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped()
    }

    /// Whether the hub has stopped delivering to this subscriber.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Detach from the instance. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(channel) = self.channel.upgrade() {
            let _ = channel.remove_subscriber(&self.id);
        }
        self.mailbox.close();
        tracing::debug!(subscriber_id = %self.id, instance_id = %self.instance_id, "subscriber detached");
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}
