//! # botfleet-settings
//!
//! Configuration for the fleet, loaded once at startup from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`FleetSettings::default()`]
//! 2. **Config file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `BOTFLEET_*` overrides (highest priority)
//!
//! The result is validated before it is handed out: a bot without a host or
//! username is a startup error, not a runtime surprise.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, parse_settings};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = FleetSettings::default();
        assert!(settings.bots.is_empty());
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }
}
