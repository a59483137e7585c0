//! # botfleet-core
//!
//! Shared vocabulary for the botfleet crates:
//!
//! - **Branded IDs**: [`InstanceId`] and [`SubscriberId`] as newtypes
//! - **Transport errors**: [`TransportError`] with an enumerated
//!   [`TransportErrorKind`] so callers never match on message text
//! - **Clock**: [`now_ms`] wall-clock milliseconds used on every frame
//! - **Constants**: dedup window, default timeouts and ports

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod time;

pub use errors::{TransportError, TransportErrorKind};
pub use ids::{InstanceId, SubscriberId};
pub use time::now_ms;
