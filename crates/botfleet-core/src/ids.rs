//! Branded ID newtypes for type safety.
//!
//! An instance id and a subscriber id are both strings on the wire, but
//! mixing them up is always a bug. Each gets its own newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::INSTANCE_ID_PREFIX;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (`<prefix>_<uuid v7>`).
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

branded_id!(
    /// Stable identifier of one managed bot instance.
    InstanceId,
    "inst"
);
branded_id!(
    /// Identifier of one live subscriber channel.
    SubscriberId,
    "sub"
);

impl InstanceId {
    /// The id assigned to the `index`-th configured bot: `instance-<index>`.
    #[must_use]
    pub fn indexed(index: usize) -> Self {
        Self(format!("{INSTANCE_ID_PREFIX}-{index}"))
    }
}
