#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeworker Core
//!
//! Adaptive-concurrency message pipeline worker.
//!
//! ## Overview
//!
//! A [`Worker`] consumes messages from one or more [`Source`]s, runs each
//! through a user [`Handler`] with bounded concurrency, and routes the outcome:
//! successful results go to an output [`Sink`], failures to an optional error
//! sink. In dynamic mode the concurrency ceiling is retuned once per window by
//! hill-climbing on observed throughput.
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Worker orchestrator, concurrency governor and stages
//! - [`messaging`] - Message, source, handler and sink contracts plus in-memory adapters
//! - [`config`] - Worker settings and layered loading
//! - [`metrics`] - Metric observation points and the Prometheus exporter
//! - [`logging`] - Structured logging setup
//! - [`error`] - Worker-level error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeworker_core::config::{ConcurrencySettings, WorkerSettings};
//! use pipeworker_core::messaging::{FnHandler, RawMessage, RecordingSink, VecSource};
//! use pipeworker_core::Worker;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = WorkerSettings::new("uppercase")
//!     .with_concurrency(ConcurrencySettings::dynamic(4, 2, 5_000));
//!
//! let worker = Worker::builder(settings)
//!     .source(VecSource::from_payloads("letters", ["a", "b", "c"]))
//!     .handler(FnHandler::shared(|data: Vec<u8>| async move {
//!         Ok(Some(RawMessage::new(data.to_ascii_uppercase()).boxed()))
//!     }))
//!     .output(Arc::new(RecordingSink::new("out")))
//!     .build()?;
//!
//! let shutdown = CancellationToken::new();
//! worker.start(shutdown.clone()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod pipeline;

pub use crate::config::{ConcurrencySettings, ConfigurationError, SettingsLoader, WorkerSettings};
pub use crate::error::{PipeError, Result};
pub use crate::messaging::{
    BoxMessage, Consumer, Handler, Message, MessagingError, MessagingResult, RawMessage, Sink,
    Source,
};
pub use crate::metrics::{NoopMetrics, PipelineMetrics, PrometheusMetrics};
pub use crate::pipeline::{
    CompletedRequest, ConcurrencyGovernor, ErrorDisposition, ErrorRouter, Inbox, RequestContext,
    RouteOutcome, Worker, WorkerBuilder, WorkerState,
};
