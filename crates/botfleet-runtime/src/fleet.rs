//! Launch and shut down every configured instance.

use std::sync::Arc;

use botfleet_core::InstanceId;
use botfleet_hub::{BroadcastHub, HubError};
use botfleet_settings::BotSettings;
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::controller::{InstanceController, InstanceSnapshot};
use crate::transport::Connector;

/// Meta published for a bot: `{"bot": {"username": ...}, "displayName"?: ...}`.
pub fn instance_meta(bot: &BotSettings) -> Map<String, Value> {
    let mut meta = Map::new();
    let _ = meta.insert("bot".into(), json!({ "username": bot.username }));
    if let Some(name) = &bot.display_name {
        let _ = meta.insert("displayName".into(), Value::String(name.clone()));
    }
    meta
}

/// Every controller launched from one settings file.
pub struct Fleet {
    controllers: Vec<Arc<InstanceController>>,
}

impl Fleet {
    /// Register and start one controller per bot, with ids `instance-<index>`.
    pub async fn launch(
        bots: &[BotSettings],
        hub: &Arc<BroadcastHub>,
        connector: &Arc<dyn Connector>,
    ) -> Result<Self, HubError> {
        let mut controllers = Vec::with_capacity(bots.len());
        for (index, bot) in bots.iter().enumerate() {
            let controller = InstanceController::new(
                InstanceId::indexed(index),
                bot.clone(),
                instance_meta(bot),
                Arc::clone(hub),
                Arc::clone(connector),
            )?;
            controllers.push(Arc::new(controller));
        }
        for controller in &controllers {
            let _ = controller.start().await;
        }
        info!(instances = controllers.len(), "fleet launched");
        Ok(Self { controllers })
    }

    /// All controllers, in launch order.
    pub fn controllers(&self) -> &[Arc<InstanceController>] {
        &self.controllers
    }

    /// Controller for `id`.
    pub fn get(&self, id: &InstanceId) -> Option<&Arc<InstanceController>> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    /// Snapshot of every controller.
    pub fn snapshots(&self) -> Vec<InstanceSnapshot> {
        self.controllers.iter().map(|c| c.snapshot()).collect()
    }

    /// Stop every controller. A failure is logged and does not prevent the
    /// rest from stopping. Returns the number of failures.
    pub async fn shutdown(&self) -> usize {
        let mut failures = 0;
        for controller in &self.controllers {
            let snapshot = controller.snapshot();
            info!(
                instance_id = %snapshot.id,
                username = %controller.settings().username,
                state = %snapshot.state,
                retry_count = snapshot.retry_count,
                endpoint = %snapshot.endpoint,
                "stopping instance"
            );
            if let Err(e) = controller.stop().await {
                failures += 1;
                error!(instance_id = %snapshot.id, error = %e, "instance failed to stop cleanly");
            }
        }
        info!(instances = self.controllers.len(), failures, "fleet stopped");
        failures
    }
}
