//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid JSON or does not match the schema.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required bot field is absent or empty.
    #[error("bot {bot}: missing required field `{field}`")]
    Missing {
        /// Zero-based position of the bot in the config.
        bot: usize,
        /// Field name as written in JSON.
        field: &'static str,
    },
    /// A value is present but unusable.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display_names_bot_and_field() {
        let err = SettingsError::Missing {
            bot: 2,
            field: "username",
        };
        assert_eq!(err.to_string(), "bot 2: missing required field `username`");
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn io_error_display() {
        let err = SettingsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(err.to_string().contains("not found"));
    }
}
