//! Error types for chatline-core.

use thiserror::Error;

/// Errors raised while building or validating client configuration.
///
/// These are detected before any network call is attempted and are never
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No API key was supplied.
    #[error("API key is required")]
    MissingApiKey,

    /// A required environment variable is not set.
    #[error("{0} environment variable not set")]
    MissingEnv(String),

    /// The base URL could not be parsed.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A sampling parameter is outside its accepted range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidSetting {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid-setting error.
    pub fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ConfigError::MissingApiKey.to_string(), "API key is required");
        assert_eq!(
            ConfigError::MissingEnv("OPENAI_API_KEY".into()).to_string(),
            "OPENAI_API_KEY environment variable not set"
        );
        let err = ConfigError::invalid_setting("temperature", "must be between 0 and 2");
        assert_eq!(
            err.to_string(),
            "Invalid value for temperature: must be between 0 and 2"
        );
    }
}
