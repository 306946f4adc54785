//! # Messaging Error Types
//!
//! Errors raised by the pipeline's collaborators: source consumers, handlers
//! and sinks. Structured with thiserror so callers can match on the failing
//! component instead of inspecting strings.

use thiserror::Error;

/// Collaborator-level error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Consumer failed for source {source_name}: {message}")]
    Consumer {
        source_name: String,
        message: String,
    },

    #[error("Handler failed: {message}")]
    Handler { message: String },

    #[error("Handler panicked: {message}")]
    HandlerPanic { message: String },

    #[error("Produce to {sink} failed: {message}")]
    Produce { sink: String, message: String },

    #[error("Message decoding error: {message}")]
    Decode { message: String },

    #[error("Inbox for source {source_name} is closed: the worker is stopping")]
    InboxClosed { source_name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MessagingError {
    /// Create a consumer error
    pub fn consumer(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consumer {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create a produce error
    pub fn produce(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Produce {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a decoding error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an inbox-closed error
    pub fn inbox_closed(source_name: impl Into<String>) -> Self {
        Self::InboxClosed {
            source_name: source_name.into(),
        }
    }

    /// Build a panic error from a `catch_unwind` payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self::HandlerPanic { message }
    }

    /// Whether this error only signals that the worker is shutting down
    pub fn is_inbox_closed(&self) -> bool {
        matches!(self, Self::InboxClosed { .. })
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::decode(err.to_string())
    }
}

/// Conversion from String to MessagingError
impl From<String> for MessagingError {
    fn from(message: String) -> Self {
        MessagingError::handler(message)
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let err = MessagingError::consumer("orders", "connection reset");
        assert!(matches!(err, MessagingError::Consumer { .. }));

        let err = MessagingError::produce("dead-letter", "broker unavailable");
        assert!(matches!(err, MessagingError::Produce { .. }));

        let err = MessagingError::inbox_closed("orders");
        assert!(err.is_inbox_closed());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let err: MessagingError = json_err.into();
        assert!(matches!(err, MessagingError::Decode { .. }));

        let err: MessagingError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_panic_payloads() {
        let err = MessagingError::from_panic(Box::new("static str"));
        assert_eq!(err.to_string(), "Handler panicked: static str");

        let err = MessagingError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "Handler panicked: owned");

        let err = MessagingError::from_panic(Box::new(42_u32));
        assert_eq!(err.to_string(), "Handler panicked: Unknown panic");
    }

    #[test]
    fn test_error_display() {
        let err = MessagingError::produce("output", "timed out");
        let display_str = format!("{err}");
        assert!(display_str.contains("Produce to output failed"));
        assert!(display_str.contains("timed out"));
    }
}
