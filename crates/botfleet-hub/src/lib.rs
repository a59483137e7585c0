//! # botfleet-hub
//!
//! Process-wide registry that routes status and log events from every
//! instance controller to that instance's live subscribers.
//!
//! - Per-instance state (subscribers, dedup cursor, meta) lives behind its
//!   own lock; different instances never contend.
//! - Each subscriber owns a bounded mailbox. Log frames are dropped on
//!   overflow and a subscriber that keeps overflowing is evicted. Status
//!   frames are never dropped; consecutive pending statuses collapse to the
//!   latest.
//! - A new subscriber always sees `meta` then `status` before anything else.

pub mod dedup;
pub mod errors;
pub mod frame;
pub mod hub;
pub mod subscriber;

pub use dedup::DedupFilter;
pub use errors::HubError;
pub use frame::{Frame, LogPayload, StatusPayload};
pub use hub::{BroadcastHub, HubConfig, InstanceSummary};
pub use subscriber::SubscriberHandle;
