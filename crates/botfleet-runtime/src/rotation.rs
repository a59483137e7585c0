//! Round-robin endpoint selection.

/// Ordered, non-empty endpoint list with a cursor.
///
/// Owned by exactly one controller run; never shared.
#[derive(Clone, Debug)]
pub struct HostRotation {
    endpoints: Vec<String>,
    cursor: usize,
}

impl HostRotation {
    /// Rotation starting at `primary`, then `fallbacks` in order.
    pub fn new(primary: impl Into<String>, fallbacks: impl IntoIterator<Item = String>) -> Self {
        let mut endpoints = vec![primary.into()];
        endpoints.extend(fallbacks);
        Self {
            endpoints,
            cursor: 0,
        }
    }

    /// Build from an already ordered list. `None` if the list is empty.
    pub fn from_list(endpoints: Vec<String>) -> Option<Self> {
        let mut iter = endpoints.into_iter();
        let primary = iter.next()?;
        Some(Self::new(primary, iter))
    }

    /// Endpoint at the cursor.
    pub fn current(&self) -> &str {
        &self.endpoints[self.cursor]
    }

    /// Move to the next endpoint, wrapping to the first.
    pub fn advance(&mut self) -> &str {
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        self.current()
    }

    /// Cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
