//! # Worker Orchestrator
//!
//! Owns the configuration and collaborators, wires the stages together and
//! implements the start/stop protocol.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start()──→ Running ──parent cancelled / source failed──→ Draining ──joined──→ Stopped
//! ```
//!
//! ## Shutdown
//!
//! Every stage task, handler invocation and routing task is spawned on one
//! [`TaskTracker`]. On shutdown the inner token is cancelled, ingress stops
//! accepting, dispatch stops launching, and egress drains whatever in-flight
//! handlers still publish. The message and results queues close only after
//! their last producer is dropped, so no task ever sends into a torn-down
//! queue. The join is bounded by the configured shutdown timeout.
//!
//! ## Example
//!
//! ```rust
//! use pipeworker_core::messaging::{FnHandler, RawMessage, VecSource};
//! use pipeworker_core::{Worker, WorkerSettings, WorkerState};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let worker = Worker::builder(WorkerSettings::new("doc"))
//!     .source(VecSource::from_payloads("letters", ["a"]))
//!     .handler(FnHandler::shared(|data: Vec<u8>| async move {
//!         Ok(Some(RawMessage::new(data).boxed()))
//!     }))
//!     .build()?;
//!
//! let shutdown = CancellationToken::new();
//! shutdown.cancel();
//! worker.start(shutdown).await?;
//! assert_eq!(worker.state(), WorkerState::Stopped);
//! # Ok::<(), pipeworker_core::PipeError>(())
//! # }).unwrap();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::config::WorkerSettings;
use crate::error::{PipeError, Result};
use crate::logging::log_worker_operation;
use crate::messaging::{Handler, Sink, Source};
use crate::metrics::{NoopMetrics, PipelineMetrics};
use crate::pipeline::dispatch::DispatchStage;
use crate::pipeline::egress::{EgressStage, ResultRouter};
use crate::pipeline::ingress::{run_source, Inbox};
use crate::pipeline::{ConcurrencyGovernor, ErrorRouter, GovernorSnapshot};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl From<u8> for WorkerState {
    fn from(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Message pipeline worker
///
/// Single-use: `start` runs the pipeline once and leaves the worker
/// `Stopped`.
pub struct Worker {
    name: Arc<str>,
    settings: WorkerSettings,
    sources: Vec<Arc<dyn Source>>,
    handler: Arc<dyn Handler>,
    output: Option<Arc<dyn Sink>>,
    error_sink: Option<Arc<dyn Sink>>,
    metrics: Arc<dyn PipelineMetrics>,
    governor: Arc<ConcurrencyGovernor>,
    span: Span,
    state: AtomicU8,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("has_output", &self.output.is_some())
            .field("has_error_sink", &self.error_sink.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Worker {
    /// Start building a worker from validated settings
    pub fn builder(settings: WorkerSettings) -> WorkerBuilder {
        WorkerBuilder::new(settings)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    /// Current in-flight count and concurrency ceiling
    pub fn governor_snapshot(&self) -> GovernorSnapshot {
        self.governor.snapshot()
    }

    /// Run the pipeline until `parent` is cancelled or a source fails.
    ///
    /// Returns `Ok(())` on external cancellation and the source error when a
    /// consumer fails. All stage tasks are joined (up to the shutdown timeout)
    /// before this returns.
    pub async fn start(&self, parent: CancellationToken) -> Result<()> {
        if let Err(current) = self.state.compare_exchange(
            WorkerState::Idle as u8,
            WorkerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(PipeError::AlreadyStarted {
                worker: self.name.to_string(),
                state: WorkerState::from(current).to_string(),
            });
        }

        let span = self.span.clone();
        self.run(parent).instrument(span).await
    }

    async fn run(&self, parent: CancellationToken) -> Result<()> {
        info!(
            worker = %self.name,
            sources = self.sources.len(),
            concurrency = self.governor.ceiling(),
            dynamic = self.governor.is_dynamic(),
            "Starting pipe"
        );
        log_worker_operation("start", &self.name, "running", None);

        let inner = parent.child_token();
        let tracker = TaskTracker::new();
        let queue_capacity = self.settings.concurrency.min;
        let (message_tx, message_rx) = mpsc::channel(queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(queue_capacity);
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<PipeError>(self.sources.len().max(1));

        self.metrics
            .set_max_concurrency(&self.name, self.governor.ceiling());

        let router = ResultRouter::new(
            self.name.clone(),
            self.output.clone(),
            ErrorRouter::new(
                self.name.clone(),
                self.error_sink.clone(),
                self.settings.write_to_error_sink,
            ),
            self.metrics.clone(),
        );
        let egress = EgressStage {
            router: Arc::new(router),
            tracker: tracker.clone(),
        };
        tracker.spawn(egress.run(results_rx).in_current_span());

        let dispatch = DispatchStage {
            worker: self.name.clone(),
            governor: self.governor.clone(),
            handler: self.handler.clone(),
            metrics: self.metrics.clone(),
            tracker: tracker.clone(),
            cancellation: inner.clone(),
        };
        tracker.spawn(dispatch.run(message_rx, results_tx).in_current_span());

        if self.governor.is_dynamic() {
            let tuner = self.governor.tuner();
            tracker.spawn(
                tuner
                    .run(inner.clone(), self.metrics.clone(), self.name.clone())
                    .in_current_span(),
            );
        }

        for source in &self.sources {
            let inbox = Inbox::new(Arc::from(source.name()), message_tx.clone(), inner.clone());
            tracker.spawn(run_source(source.clone(), inbox, fatal_tx.clone()).in_current_span());
        }
        drop(message_tx);
        drop(fatal_tx);

        let outcome = tokio::select! {
            biased;
            Some(err) = fatal_rx.recv() => Err(err),
            _ = parent.cancelled() => Ok(()),
        };

        self.state
            .store(WorkerState::Draining as u8, Ordering::Release);
        match &outcome {
            Ok(()) => info!(worker = %self.name, "Pipe cancelled, draining"),
            Err(e) => warn!(worker = %self.name, error = %e, "Pipe failing, draining"),
        }
        inner.cancel();
        tracker.close();

        let timeout = self.settings.shutdown_timeout();
        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            warn!(
                worker = %self.name,
                timeout_ms = timeout.as_millis() as u64,
                in_flight = self.governor.in_flight(),
                remaining_tasks = tracker.len(),
                "Timed out waiting for pipeline tasks to finish"
            );
        }

        self.state
            .store(WorkerState::Stopped as u8, Ordering::Release);
        let status = if outcome.is_ok() { "stopped" } else { "failed" };
        log_worker_operation("stop", &self.name, status, None);
        info!(worker = %self.name, "Pipe stopped");

        outcome
    }
}

/// Builder assembling a [`Worker`] from settings and collaborators
pub struct WorkerBuilder {
    settings: WorkerSettings,
    sources: Vec<Arc<dyn Source>>,
    handler: Option<Arc<dyn Handler>>,
    output: Option<Arc<dyn Sink>>,
    error_sink: Option<Arc<dyn Sink>>,
    metrics: Option<Arc<dyn PipelineMetrics>>,
    span: Option<Span>,
}

impl WorkerBuilder {
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            sources: Vec::new(),
            handler: None,
            output: None,
            error_sink: None,
            metrics: None,
            span: None,
        }
    }

    pub fn source(mut self, source: impl Source) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn shared_source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn output(mut self, sink: Arc<dyn Sink>) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Span every worker task is instrumented with.
    ///
    /// Defaults to an `info` span named `worker` carrying the worker name.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<Worker> {
        self.settings.validate()?;

        let handler = self
            .handler
            .ok_or(PipeError::MissingComponent { component: "handler" })?;
        if self.sources.is_empty() {
            return Err(PipeError::MissingComponent { component: "source" });
        }

        let name: Arc<str> = Arc::from(self.settings.name.as_str());
        let span = self
            .span
            .unwrap_or_else(|| info_span!("worker", worker = %name));
        let governor = Arc::new(ConcurrencyGovernor::new(&self.settings.concurrency));

        Ok(Worker {
            name,
            settings: self.settings,
            sources: self.sources,
            handler,
            output: self.output,
            error_sink: self.error_sink,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            governor,
            span,
            state: AtomicU8::new(WorkerState::Idle as u8),
        })
    }
}
