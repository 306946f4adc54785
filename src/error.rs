use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use thiserror::Error;

/// Worker-level errors returned from construction and `Worker::start`.
///
/// Message-scoped failures never surface here; they terminate inside the
/// egress stage and are only visible through logs and metrics.
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Source {source_name} failed: {source}")]
    Source {
        source_name: String,
        #[source]
        source: MessagingError,
    },

    #[error("Worker {worker} was already started (state: {state})")]
    AlreadyStarted { worker: String, state: String },

    #[error("Worker component missing: {component}")]
    MissingComponent { component: &'static str },

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal pipeline error: {message}")]
    Internal { message: String },
}

impl PipeError {
    /// Create a source failure error
    pub fn source_failure(source_name: impl Into<String>, source: MessagingError) -> Self {
        Self::Source {
            source_name: source_name.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error came from a source consumer
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::Source { .. })
    }

    /// The underlying consumer error, when this is a source failure
    pub fn source_error(&self) -> Option<&MessagingError> {
        match self {
            Self::Source { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipeError>;
