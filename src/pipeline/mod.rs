//! # Message Pipeline
//!
//! Stages of a running worker:
//!
//! ```text
//! sources ─→ ingress ─→ [messages] ─→ dispatch ─→ handler ─→ [results] ─→ egress ─→ output sink
//!                                        ↑                                   └──→ error router ─→ error sink
//!                                    governor ←── tuner
//! ```
//!
//! Both queues are bounded at the configured minimum concurrency. Dispatch
//! launches a handler only while the governor reports free capacity, so a slow
//! handler backs up the queue and eventually blocks the sources.

mod context;
pub(crate) mod dispatch;
mod egress;
mod error_router;
mod governor;
mod ingress;
mod worker;

pub use context::{CompletedRequest, RequestContext};
pub use egress::{ResultRouter, RouteOutcome};
pub use error_router::{ErrorDisposition, ErrorRouter};
pub use governor::{
    ConcurrencyGovernor, GovernorSnapshot, InFlightGuard, Tuner, TuningDecision, TuningStep,
    BACKPRESSURE_POLL_INTERVAL,
};
pub use ingress::Inbox;
pub use worker::{Worker, WorkerBuilder, WorkerState};
