//! # Request Context
//!
//! Per-message envelope created by the ingress stage and consumed exactly once
//! by the egress stage. The handler result is attached by consuming the
//! context, so the result slot can only ever be written once and only by the
//! task that owns the message.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::messaging::{BoxMessage, Message, MessagingError, MessagingResult};

/// Envelope for one inbound message
pub struct RequestContext {
    id: Uuid,
    source: Arc<str>,
    started_at: Instant,
    received_at: DateTime<Utc>,
    message: BoxMessage,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Wrap a message that arrived from `source`
    pub fn new(source: Arc<str>, message: BoxMessage, cancellation: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            started_at: Instant::now(),
            received_at: Utc::now(),
            message,
            cancellation,
        }
    }

    /// Context with its own cancellation token, for calling handlers and
    /// sinks outside a running worker
    pub fn detached(source: &str, message: BoxMessage) -> Self {
        Self::new(Arc::from(source), message, CancellationToken::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the source the message came from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Wall-clock arrival time, for logs
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Time spent in the pipeline so far (queueing plus processing)
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// Token cancelled when the worker begins shutting down.
    ///
    /// Long-running handlers may watch it; the pipeline never forcibly
    /// interrupts a handler.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Attach the handler outcome
    pub fn with_result(self, result: MessagingResult<Option<BoxMessage>>) -> CompletedRequest {
        CompletedRequest { ctx: self, result }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("received_at", &self.received_at)
            .field("message", &self.message.as_ref())
            .finish()
    }
}

/// A context whose handler invocation has finished
#[derive(Debug)]
pub struct CompletedRequest {
    ctx: RequestContext,
    result: MessagingResult<Option<BoxMessage>>,
}

impl CompletedRequest {
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// The result message (if any) or the handler error
    pub fn result(&self) -> Result<Option<&dyn Message>, &MessagingError> {
        match &self.result {
            Ok(message) => Ok(message.as_deref()),
            Err(e) => Err(e),
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }

    pub fn into_parts(self) -> (RequestContext, MessagingResult<Option<BoxMessage>>) {
        (self.ctx, self.result)
    }
}
