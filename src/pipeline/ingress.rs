//! # Ingress Stage
//!
//! One task per configured source. Each task drives the source's consumer and
//! funnels every inbound message, wrapped in a [`RequestContext`], into the
//! shared bounded message queue. A full queue blocks delivery, which is the
//! second layer of backpressure next to the concurrency ceiling.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PipeError;
use crate::logging::log_error;
use crate::messaging::{BoxMessage, MessagingError, MessagingResult, Source};
use crate::pipeline::RequestContext;

/// Delivery handle given to a consumer
///
/// Cloneable, so consumers may deliver concurrently. Once the worker begins
/// stopping every delivery is refused with [`MessagingError::InboxClosed`].
#[derive(Debug, Clone)]
pub struct Inbox {
    source: Arc<str>,
    sender: mpsc::Sender<RequestContext>,
    cancellation: CancellationToken,
}

impl Inbox {
    pub(crate) fn new(
        source: Arc<str>,
        sender: mpsc::Sender<RequestContext>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            source,
            sender,
            cancellation,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source
    }

    /// True once the worker is stopping or the message queue is gone
    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves when [`Inbox::is_closed`] becomes true
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.cancellation.cancelled() => {}
            _ = self.sender.closed() => {}
        }
    }

    /// Hand one message to the pipeline, waiting for queue capacity
    pub async fn deliver(&self, message: BoxMessage) -> MessagingResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(MessagingError::inbox_closed(self.source.as_ref()));
        }

        let ctx = RequestContext::new(self.source.clone(), message, self.cancellation.clone());
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                Err(MessagingError::inbox_closed(self.source.as_ref()))
            }
            sent = self.sender.send(ctx) => {
                sent.map_err(|_| MessagingError::inbox_closed(self.source.as_ref()))
            }
        }
    }
}

/// Drive one source until it is exhausted, stopped or fails.
///
/// A consumer failure while the worker is running is reported on `fatal` and
/// cancels the pipeline. Failures after shutdown began are only logged.
pub(crate) async fn run_source(
    source: Arc<dyn Source>,
    inbox: Inbox,
    fatal: mpsc::Sender<PipeError>,
) {
    let name = source.name().to_string();
    info!(source = %name, "Start reading from source");

    let mut consumer = source.create_consumer();
    let result = consumer.iterate(inbox.clone()).await;

    match result {
        Ok(()) => {
            info!(source = %name, "Source consumer finished");
        }
        Err(e) if e.is_inbox_closed() => {
            debug!(source = %name, "Source consumer stopped with the worker");
        }
        Err(e) if inbox.cancellation.is_cancelled() => {
            warn!(source = %name, error = %e, "Source consumer failed while stopping");
        }
        Err(e) => {
            log_error("ingress", "iterate", &e.to_string(), Some(&name));
            // Dispatch must be stopped before the orchestrator can observe the failure
            inbox.cancellation.cancel();
            if let Err(send_error) = fatal.try_send(PipeError::source_failure(&name, e)) {
                warn!(source = %name, error = %send_error, "Could not report source failure");
            }
        }
    }
}
