//! The broadcast hub.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use botfleet_core::constants::DEDUP_WINDOW_MS;
use botfleet_core::{InstanceId, SubscriberId, now_ms};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::dedup::DedupFilter;
use crate::errors::HubError;
use crate::frame::{Frame, LogPayload, StatusPayload};
use crate::subscriber::{Delivery, Mailbox, SubscriberHandle};

/// Delivery limits applied to every subscriber.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Pending log frames a subscriber may hold before new ones are dropped.
    pub subscriber_queue: usize,
    /// Dropped log frames after which a subscriber is evicted.
    pub max_subscriber_drops: u64,
    /// Duplicate-suppression window.
    pub dedup_window_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue: 256,
            max_subscriber_drops: 100,
            dedup_window_ms: DEDUP_WINDOW_MS,
        }
    }
}

/// Entry returned by [`BroadcastHub::list_instances`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstanceSummary {
    /// Instance id.
    pub id: InstanceId,
    /// Registration meta plus the current `connected` flag.
    pub meta: Map<String, Value>,
}

struct ChannelState {
    meta: Map<String, Value>,
    connected: bool,
    open: bool,
    subscribers: HashMap<SubscriberId, Arc<Mailbox>>,
    dedup: DedupFilter,
}

impl ChannelState {
    fn meta_with_connected(&self) -> Map<String, Value> {
        let mut meta = self.meta.clone();
        let _ = meta.insert("connected".into(), Value::Bool(self.connected));
        meta
    }

    /// Push to every subscriber; evict the ones that are closed or too slow.
    fn fan_out(&mut self, instance_id: &InstanceId, frame: &Frame, max_drops: u64) -> usize {
        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (sub_id, mailbox) in &self.subscribers {
            match mailbox.push(frame.clone()) {
                Delivery::Queued => delivered += 1,
                Delivery::Dropped { total } if total >= max_drops => {
                    evicted.push((sub_id.clone(), total));
                }
                Delivery::Dropped { .. } => {}
                Delivery::Closed => evicted.push((sub_id.clone(), 0)),
            }
        }
        for (sub_id, drops) in evicted {
            if let Some(mailbox) = self.subscribers.remove(&sub_id) {
                mailbox.close();
                if drops > 0 {
                    warn!(%instance_id, subscriber_id = %sub_id, drops, "evicting slow subscriber");
                }
            }
        }
        delivered
    }
}

/// Per-instance slot. Everything for one id is serialized by `state`.
pub(crate) struct InstanceChannel {
    seq: u64,
    state: Mutex<ChannelState>,
}

impl InstanceChannel {
    fn new(seq: u64, meta: Map<String, Value>, dedup_window_ms: u64) -> Self {
        Self {
            seq,
            state: Mutex::new(ChannelState {
                meta,
                connected: false,
                open: true,
                subscribers: HashMap::new(),
                dedup: DedupFilter::new(dedup_window_ms),
            }),
        }
    }

    pub(crate) fn remove_subscriber(&self, id: &SubscriberId) -> bool {
        self.state.lock().subscribers.remove(id).is_some()
    }
}

/// Routes events from instance controllers to their subscribers.
///
/// Shared by reference (`Arc<BroadcastHub>`) between the fleet and the
/// gateway. There is no lock spanning all instances: the id map is sharded
/// and every instance carries its own mutex.
pub struct BroadcastHub {
    instances: DashMap<InstanceId, Arc<InstanceChannel>>,
    config: HubConfig,
    next_seq: AtomicU64,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            instances: DashMap::new(),
            config,
            next_seq: AtomicU64::new(0),
        }
    }

    fn channel(&self, id: &InstanceId) -> Option<Arc<InstanceChannel>> {
        self.instances.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Make an instance visible with the given meta. Starts offline.
    pub fn register_instance(
        &self,
        id: InstanceId,
        meta: Map<String, Value>,
    ) -> Result<(), HubError> {
        match self.instances.entry(id) {
            Entry::Occupied(entry) => {
                warn!(instance_id = %entry.key(), "instance already registered");
                Err(HubError::AlreadyRegistered(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                info!(instance_id = %entry.key(), "instance registered");
                let _ = entry.insert(Arc::new(InstanceChannel::new(
                    seq,
                    meta,
                    self.config.dedup_window_ms,
                )));
                Ok(())
            }
        }
    }

    /// Close every subscriber of `id` and forget it. Returns whether it existed.
    pub fn unregister_instance(&self, id: &InstanceId) -> bool {
        let Some((_, channel)) = self.instances.remove(id) else {
            return false;
        };
        let mut state = channel.state.lock();
        state.open = false;
        let closed = state.subscribers.len();
        for (_, mailbox) in state.subscribers.drain() {
            mailbox.close();
        }
        info!(instance_id = %id, subscribers = closed, "instance unregistered");
        true
    }

    /// Record the connected flag and push a status frame to every subscriber.
    ///
    /// Returns the number of subscribers the frame was queued for.
    pub fn publish_status(&self, id: &InstanceId, connected: bool) -> usize {
        let Some(channel) = self.channel(id) else {
            debug!(instance_id = %id, "status for unknown instance ignored");
            return 0;
        };
        let frame = Frame::Status(StatusPayload {
            connected,
            ts: now_ms(),
        });
        let mut state = channel.state.lock();
        state.connected = connected;
        let recipients = state.fan_out(id, &frame, self.config.max_subscriber_drops);
        debug!(instance_id = %id, connected, recipients, "status published");
        recipients
    }

    /// Deduplicate and push a log frame to every subscriber.
    ///
    /// Returns the number of subscribers the frame was queued for (zero when
    /// suppressed as a duplicate).
    pub fn publish_log(&self, id: &InstanceId, text: impl Into<String>, ts_ms: u64) -> usize {
        let Some(channel) = self.channel(id) else {
            debug!(instance_id = %id, "log for unknown instance ignored");
            return 0;
        };
        let text = text.into();
        let mut state = channel.state.lock();
        if !state.dedup.admit(&text, ts_ms) {
            trace!(instance_id = %id, "duplicate log suppressed");
            return 0;
        }
        let frame = Frame::Log(LogPayload {
            id: id.clone(),
            text,
            ts: ts_ms,
        });
        state.fan_out(id, &frame, self.config.max_subscriber_drops)
    }

    /// Attach a new subscriber.
    ///
    /// The handle's first two frames are always `meta` then `status`.
    pub fn subscribe(&self, id: &InstanceId) -> Result<SubscriberHandle, HubError> {
        let channel = self
            .channel(id)
            .ok_or_else(|| HubError::InstanceNotFound(id.clone()))?;
        let sub_id = SubscriberId::new();
        let mailbox = Arc::new(Mailbox::new(self.config.subscriber_queue));
        {
            let mut state = channel.state.lock();
            if !state.open {
                return Err(HubError::InstanceNotFound(id.clone()));
            }
            let _ = mailbox.push(Frame::Meta(state.meta_with_connected()));
            let _ = mailbox.push(Frame::Status(StatusPayload {
                connected: state.connected,
                ts: now_ms(),
            }));
            let _ = state
                .subscribers
                .insert(sub_id.clone(), Arc::clone(&mailbox));
        }
        debug!(instance_id = %id, subscriber_id = %sub_id, "subscriber attached");
        Ok(SubscriberHandle::new(
            sub_id,
            id.clone(),
            mailbox,
            Arc::downgrade(&channel),
        ))
    }

    /// Detach a subscriber. Equivalent to [`SubscriberHandle::unsubscribe`].
    pub fn unsubscribe(&self, handle: &SubscriberHandle) {
        handle.unsubscribe();
    }

    /// Snapshot of every registered instance, in registration order.
    pub fn list_instances(&self) -> Vec<InstanceSummary> {
        let channels: Vec<(InstanceId, Arc<InstanceChannel>)> = self
            .instances
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let mut rows: Vec<(u64, InstanceSummary)> = channels
            .into_iter()
            .map(|(id, channel)| {
                let meta = channel.state.lock().meta_with_connected();
                (channel.seq, InstanceSummary { id, meta })
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    /// Last published connected flag.
    pub fn is_connected(&self, id: &InstanceId) -> Option<bool> {
        self.channel(id).map(|c| c.state.lock().connected)
    }

    /// Number of registered instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Live subscribers across all instances.
    pub fn subscriber_count(&self) -> usize {
        let channels: Vec<Arc<InstanceChannel>> = self
            .instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        channels
            .iter()
            .map(|c| c.state.lock().subscribers.len())
            .sum()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
