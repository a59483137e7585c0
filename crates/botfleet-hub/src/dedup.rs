//! Consecutive-duplicate suppression for log lines.

use botfleet_core::constants::DEDUP_WINDOW_MS;

/// Remembers the last admitted line of one instance.
///
/// A line is suppressed when its text equals the last admitted text and its
/// timestamp is less than `window_ms` after the last admitted timestamp.
/// Suppressed lines leave the cursor untouched.
#[derive(Clone, Debug)]
pub struct DedupFilter {
    window_ms: u64,
    last: Option<(String, u64)>,
}

impl DedupFilter {
    /// Filter with a custom window.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last: None,
        }
    }

    /// Returns `true` if the line should be delivered.
    pub fn admit(&mut self, text: &str, ts_ms: u64) -> bool {
        if let Some((last_text, last_ts)) = &self.last {
            if last_text == text && ts_ms.saturating_sub(*last_ts) < self.window_ms {
                return false;
            }
        }
        self.last = Some((text.to_owned(), ts_ms));
        true
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW_MS)
    }
}
