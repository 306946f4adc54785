//! # Dispatch Stage
//!
//! Drains the shared message queue and launches one concurrent handler
//! invocation per message, bounded by the governor's ceiling.
//!
//! ```text
//! message queue → [wait for in_flight < ceiling] → spawn handler → results queue
//!                          │                              │
//!                          └─ 10ms capacity poll          └─ completion order
//! ```
//!
//! Handler panics are caught and turned into handler failures, so a broken
//! handler never leaks an in-flight slot or loses its message.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument};

use crate::messaging::{Handler, MessagingError};
use crate::metrics::PipelineMetrics;
use crate::pipeline::{CompletedRequest, ConcurrencyGovernor, InFlightGuard, RequestContext};

pub(crate) struct DispatchStage {
    pub(crate) worker: Arc<str>,
    pub(crate) governor: Arc<ConcurrencyGovernor>,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) metrics: Arc<dyn PipelineMetrics>,
    pub(crate) tracker: TaskTracker,
    pub(crate) cancellation: CancellationToken,
}

impl DispatchStage {
    /// Run until cancelled or until every ingress sender is gone.
    ///
    /// Messages still queued when the stage stops are never dispatched; their
    /// sources remain responsible for redelivery.
    pub(crate) async fn run(
        self,
        mut messages: mpsc::Receiver<RequestContext>,
        results: mpsc::Sender<CompletedRequest>,
    ) {
        let mut dispatched: u64 = 0;

        loop {
            let ctx = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                next = messages.recv() => match next {
                    Some(ctx) => ctx,
                    None => break,
                },
            };

            if !self.governor.wait_for_capacity(&self.cancellation).await {
                debug!(
                    worker = %self.worker,
                    source = %ctx.source(),
                    request_id = %ctx.id(),
                    "Worker stopping, message not dispatched"
                );
                break;
            }

            let guard = self.governor.begin();
            dispatched += 1;
            self.tracker.spawn(
                invoke(
                    self.worker.clone(),
                    self.handler.clone(),
                    self.metrics.clone(),
                    ctx,
                    guard,
                    results.clone(),
                )
                .in_current_span(),
            );
        }

        messages.close();
        debug!(
            worker = %self.worker,
            dispatched,
            in_flight = self.governor.in_flight(),
            "Dispatch stage stopped"
        );
    }
}

async fn invoke(
    worker: Arc<str>,
    handler: Arc<dyn Handler>,
    metrics: Arc<dyn PipelineMetrics>,
    ctx: RequestContext,
    guard: InFlightGuard,
    results: mpsc::Sender<CompletedRequest>,
) {
    let result = AssertUnwindSafe(handler.handle(&ctx, ctx.message()))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(MessagingError::from_panic(panic)));
    drop(guard);

    metrics.observe_handler_latency(&worker, ctx.source(), result.is_err(), ctx.elapsed());
    if let Err(e) = &result {
        debug!(
            worker = %worker,
            source = %ctx.source(),
            request_id = %ctx.id(),
            error = %e,
            "Handler returned error"
        );
    }

    if results.send(ctx.with_result(result)).await.is_err() {
        warn!(worker = %worker, "Results queue closed, completed message dropped");
    }
}
