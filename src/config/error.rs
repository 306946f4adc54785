//! Configuration Error Types
//!
//! Specific, actionable errors for settings loading and validation.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Missing required configuration field
    #[error("Missing required configuration field '{field}'")]
    MissingRequiredField { field: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// File or environment source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigurationError {
    /// Create a missing required field error
    pub fn missing_field<F: Into<String>>(field: F) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: ToString, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    /// Field the error refers to, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { field } | Self::InvalidValue { field, .. } => Some(field),
            Self::Load(_) => None,
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigurationError::invalid_value("concurrency.min", 0, "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'concurrency.min': must be at least 1"
        );
        assert_eq!(err.field(), Some("concurrency.min"));

        let err = ConfigurationError::missing_field("name");
        assert_eq!(err.to_string(), "Missing required configuration field 'name'");
    }
}
