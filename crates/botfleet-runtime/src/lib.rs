//! # botfleet-runtime
//!
//! Drives each managed bot through its connection lifecycle.
//!
//! - [`InstanceController`]: one task per instance running the
//!   connect → monitor → reconnect state machine
//! - [`HostRotation`]: round-robin endpoint cursor, advanced on
//!   endpoint-class failures only
//! - [`transport`]: the boundary to the wire protocol client
//! - [`Fleet`]: launches one controller per configured bot and stops them all
//!   on shutdown

pub mod behaviors;
pub mod controller;
pub mod errors;
pub mod fleet;
pub mod rotation;
pub mod transport;

pub use controller::{InstanceController, InstanceSnapshot, InstanceState};
pub use errors::{ControllerError, Result};
pub use fleet::{Fleet, instance_meta};
pub use rotation::HostRotation;
pub use transport::{ConnectRequest, Connector, TransportEvent, TransportSession, TransportSink};
