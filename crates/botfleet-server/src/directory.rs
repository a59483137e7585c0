//! Which instances can accept `POST /send`.

use std::sync::Arc;

use async_trait::async_trait;
use botfleet_core::InstanceId;
use botfleet_runtime::{Fleet, InstanceController};
use dashmap::DashMap;

/// Something that can deliver a chat message for one instance.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver `message`. The error text is returned to the HTTP caller.
    async fn send_message(&self, message: &str) -> Result<(), String>;
}

#[async_trait]
impl MessageSender for InstanceController {
    async fn send_message(&self, message: &str) -> Result<(), String> {
        self.send(message).await.map_err(|e| e.to_string())
    }
}

/// Send capability per instance id.
#[derive(Default)]
pub struct InstanceDirectory {
    senders: DashMap<InstanceId, Arc<dyn MessageSender>>,
}

impl InstanceDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per controller in `fleet`.
    pub fn from_fleet(fleet: &Fleet) -> Self {
        let directory = Self::new();
        for controller in fleet.controllers() {
            let sender: Arc<dyn MessageSender> = controller.clone();
            directory.insert(controller.id().clone(), sender);
        }
        directory
    }

    /// Add or replace the sender for `id`.
    pub fn insert(&self, id: InstanceId, sender: Arc<dyn MessageSender>) {
        let _ = self.senders.insert(id, sender);
    }

    /// Sender for `id`.
    pub fn get(&self, id: &InstanceId) -> Option<Arc<dyn MessageSender>> {
        self.senders.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of senders.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether there are no senders.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
