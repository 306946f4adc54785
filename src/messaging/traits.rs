//! # Collaborator Traits
//!
//! The capability contracts the pipeline consumes but does not implement:
//! where messages come from, what processes them and where results go.
//!
//! ## Architecture
//!
//! ```text
//! Source ──create_consumer()──→ Consumer ──iterate(inbox)──→ Inbox ──→ [pipeline]
//!                                                                         │
//!                          Handler::handle(ctx, message) ←────────────────┘
//!                                   │
//!                 ┌─────────────────┴─────────────────┐
//!                 ▼                                   ▼
//!       output Sink::produce                 error Sink::produce
//! ```
//!
//! ## Thread Safety
//!
//! Handlers and sinks are shared behind `Arc` and invoked from many tasks at
//! once, so implementations must be `Send + Sync`. A consumer is owned by the
//! single ingress task driving it.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::errors::MessagingResult;
use super::message::{BoxMessage, Message};
use crate::pipeline::{Inbox, RequestContext};

/// A named origin of messages
pub trait Source: Send + Sync + 'static {
    /// Name used for logs and metric labels
    fn name(&self) -> &str;

    /// Create a fresh consumer for this source
    fn create_consumer(&self) -> Box<dyn Consumer>;
}

/// Pulls messages from a source and delivers them through an [`Inbox`]
#[async_trait]
pub trait Consumer: Send + 'static {
    /// Deliver every inbound message via `inbox.deliver(..)`.
    ///
    /// Must return when the source is exhausted, when the inbox reports the
    /// worker is stopping (`inbox.is_closed()` / `inbox.closed().await`), or
    /// with an error on unrecoverable failure. An error is fatal to the worker.
    async fn iterate(&mut self, inbox: Inbox) -> MessagingResult<()>;
}

/// Business processing for a single message
///
/// Returning `Ok(None)` means the message was consumed without producing
/// output (filtered). Errors are routed to the error sink.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: &RequestContext,
        message: &dyn Message,
    ) -> MessagingResult<Option<BoxMessage>>;
}

/// Destination for messages (output and error sinks share this contract)
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Name used for logs
    fn name(&self) -> &str;

    async fn produce(&self, ctx: &RequestContext, message: &dyn Message) -> MessagingResult<()>;
}

/// Closure-backed handler
///
/// Handy for tests and small adapters. The closure receives the payload bytes
/// and returns the handler result.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MessagingResult<Option<BoxMessage>>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wrap directly into the shared form the worker expects
    pub fn shared(f: F) -> Arc<dyn Handler> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MessagingResult<Option<BoxMessage>>> + Send + 'static,
{
    async fn handle(
        &self,
        _ctx: &RequestContext,
        message: &dyn Message,
    ) -> MessagingResult<Option<BoxMessage>> {
        (self.f)(message.data().to_vec()).await
    }
}
