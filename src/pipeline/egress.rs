//! # Egress Stage
//!
//! Drains the results queue and routes every completed request on its own
//! task: successful results go to the output sink, failures to the
//! [`ErrorRouter`]. The stage keeps draining after cancellation until the
//! last in-flight handler has published its result and the queue closes.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, Instrument};

use crate::messaging::Sink;
use crate::metrics::PipelineMetrics;
use crate::pipeline::{CompletedRequest, ErrorDisposition, ErrorRouter};

/// Terminal disposition of one completed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Result message produced to the output sink
    Delivered,
    /// Handler produced no result message
    Filtered,
    /// Handler produced a result but no output sink is configured
    Discarded,
    /// Handler or output produce failed; the error path decided the rest
    Failed(ErrorDisposition),
}

impl RouteOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Routes completed requests to the output sink or the error path
pub struct ResultRouter {
    worker: Arc<str>,
    output: Option<Arc<dyn Sink>>,
    errors: ErrorRouter,
    metrics: Arc<dyn PipelineMetrics>,
}

impl std::fmt::Debug for ResultRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultRouter")
            .field("worker", &self.worker)
            .field("output", &self.output.as_ref().map(|s| s.name().to_string()))
            .field("errors", &self.errors)
            .finish()
    }
}

impl ResultRouter {
    pub fn new(
        worker: Arc<str>,
        output: Option<Arc<dyn Sink>>,
        errors: ErrorRouter,
        metrics: Arc<dyn PipelineMetrics>,
    ) -> Self {
        Self {
            worker,
            output,
            errors,
            metrics,
        }
    }

    /// Route one completed request and record its end-to-end latency
    pub async fn route(&self, completed: CompletedRequest) -> RouteOutcome {
        let (ctx, result) = completed.into_parts();

        let outcome = match result {
            Err(handler_error) => {
                RouteOutcome::Failed(self.errors.route(&ctx, &handler_error).await)
            }
            Ok(None) => RouteOutcome::Filtered,
            Ok(Some(message)) => match &self.output {
                None => RouteOutcome::Discarded,
                Some(output) => match output.produce(&ctx, message.as_ref()).await {
                    Ok(()) => RouteOutcome::Delivered,
                    Err(produce_error) => {
                        debug!(
                            worker = %self.worker,
                            source = %ctx.source(),
                            request_id = %ctx.id(),
                            output = %output.name(),
                            error = %produce_error,
                            "Output produce failed, routing to error path"
                        );
                        RouteOutcome::Failed(self.errors.route(&ctx, &produce_error).await)
                    }
                },
            },
        };

        self.metrics.observe_pipe_latency(
            &self.worker,
            ctx.source(),
            outcome.is_failure(),
            ctx.elapsed(),
        );
        outcome
    }
}

pub(crate) struct EgressStage {
    pub(crate) router: Arc<ResultRouter>,
    pub(crate) tracker: TaskTracker,
}

impl EgressStage {
    /// Run until every results sender is dropped
    pub(crate) async fn run(self, mut results: mpsc::Receiver<CompletedRequest>) {
        let mut routed: u64 = 0;
        while let Some(completed) = results.recv().await {
            routed += 1;
            let router = self.router.clone();
            self.tracker.spawn(
                async move {
                    router.route(completed).await;
                }
                .in_current_span(),
            );
        }
        debug!(worker = %self.router.worker, routed, "Egress stage stopped");
    }
}
