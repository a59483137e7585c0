//! # botfleet-logging
//!
//! Global `tracing` subscriber setup.
//!
//! The filter is built from [`LoggingSettings`]: the default level plus any
//! per-module overrides. `RUST_LOG`, when set, replaces the whole filter.
//! Output goes to stderr, either as compact human-readable lines or as one
//! JSON object per event.

use botfleet_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Build the filter directive string, e.g. `info,botfleet_hub=debug`.
pub fn filter_directives(settings: &LoggingSettings) -> String {
    let mut directives = settings.level.to_lowercase();
    for (module, level) in &settings.modules {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(&level.to_lowercase());
    }
    directives
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; later calls are
/// no-ops.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(settings)));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_span_list(true)
                .with_writer(std::io::stderr);
            registry.with(layer).try_init().is_ok()
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact();
            registry.with(layer).try_init().is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_level_only() {
        assert_eq!(filter_directives(&LoggingSettings::default()), "info");
    }

    #[test]
    fn directives_include_module_overrides() {
        let mut settings = LoggingSettings {
            level: "WARN".into(),
            ..LoggingSettings::default()
        };
        let _ = settings.modules.insert("botfleet_hub".into(), "debug".into());
        let _ = settings.modules.insert("botfleet_runtime".into(), "trace".into());
        assert_eq!(
            filter_directives(&settings),
            "warn,botfleet_hub=debug,botfleet_runtime=trace"
        );
    }

    #[test]
    fn second_init_is_noop() {
        let settings = LoggingSettings::default();
        let _ = init_logging(&settings);
        assert!(!init_logging(&settings));
    }
}
