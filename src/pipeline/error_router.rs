//! # Error Router
//!
//! Terminal handling for messages whose processing or delivery failed. A
//! failed message is forwarded to the error sink at most once; anything that
//! cannot be forwarded is logged and dropped. Nothing here is fatal to the
//! worker.

use std::sync::Arc;
use tracing::{debug, error};

use crate::messaging::{MessagingError, RawMessage, Sink};
use crate::pipeline::RequestContext;

/// What happened to a failed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The source already disposed of the message; nothing was forwarded
    SkippedAborted,
    /// The payload was produced to the error sink
    Forwarded,
    /// Logged as unrecoverable and dropped
    Dropped,
}

/// Decides whether failed messages reach the error sink
#[derive(Clone)]
pub struct ErrorRouter {
    worker: Arc<str>,
    error_sink: Option<Arc<dyn Sink>>,
    forward: bool,
}

impl std::fmt::Debug for ErrorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRouter")
            .field("worker", &self.worker)
            .field("error_sink", &self.error_sink.as_ref().map(|s| s.name().to_string()))
            .field("forward", &self.forward)
            .finish()
    }
}

impl ErrorRouter {
    pub fn new(worker: Arc<str>, error_sink: Option<Arc<dyn Sink>>, forward: bool) -> Self {
        Self {
            worker,
            error_sink,
            forward,
        }
    }

    /// Whether failed messages will be produced to an error sink
    pub fn forwards(&self) -> bool {
        self.forward && self.error_sink.is_some()
    }

    /// Route one failed message
    pub async fn route(&self, ctx: &RequestContext, failure: &MessagingError) -> ErrorDisposition {
        let message = ctx.message();
        if message.aborted() {
            debug!(
                worker = %self.worker,
                source = %ctx.source(),
                request_id = %ctx.id(),
                error = %failure,
                "Message already disposed upstream, not forwarding"
            );
            return ErrorDisposition::SkippedAborted;
        }

        let sink = match &self.error_sink {
            Some(sink) if self.forward => sink,
            _ => {
                self.log_unrecoverable(ctx, failure);
                return ErrorDisposition::Dropped;
            }
        };

        let copy = RawMessage::copy_from(message);
        match sink.produce(ctx, &copy).await {
            Ok(()) => {
                debug!(
                    worker = %self.worker,
                    source = %ctx.source(),
                    request_id = %ctx.id(),
                    error_sink = %sink.name(),
                    error = %failure,
                    "Forwarded failed message to error sink"
                );
                ErrorDisposition::Forwarded
            }
            Err(produce_error) => {
                self.log_unrecoverable(ctx, &produce_error);
                ErrorDisposition::Dropped
            }
        }
    }

    fn log_unrecoverable(&self, ctx: &RequestContext, failure: &MessagingError) {
        error!(
            worker = %self.worker,
            source = %ctx.source(),
            request_id = %ctx.id(),
            error = %failure,
            "Failed to process message"
        );
    }
}
