//! Wall-clock helpers.

/// Milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
