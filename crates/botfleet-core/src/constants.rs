//! Defaults shared between settings, runtime, and hub.

/// Identical log lines inside this window are collapsed into one.
pub const DEDUP_WINDOW_MS: u64 = 2_000;

/// How long a connect attempt may wait for the transport to report `connected`.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Fixed pause between a failure and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Automatic retries before an instance gives up and enters `Failed`.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default remote game port.
pub const DEFAULT_REMOTE_PORT: u16 = 19_132;

/// Default protocol version string handed to the transport.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.21.100";

/// Minimum interval accepted for a periodic announcement.
pub const MIN_ANNOUNCEMENT_INTERVAL_MS: u64 = 1_000;

/// Prefix for the ids assigned to launched instances (`instance-0`, ...).
pub const INSTANCE_ID_PREFIX: &str = "instance";
