#![allow(dead_code)]

pub mod metrics;
pub mod strategies;

pub use metrics::*;

use pipeworker_core::config::{ConcurrencySettings, WorkerSettings};
use pipeworker_core::messaging::{FnHandler, Handler, MessagingError, RawMessage};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any wait in the integration tests
pub const WAIT: Duration = Duration::from_secs(5);

pub fn fixed_settings(name: &str, concurrency: usize) -> WorkerSettings {
    WorkerSettings::new(name).with_concurrency(ConcurrencySettings::fixed(concurrency))
}

/// Echo handler failing on payloads listed in `failing`
pub fn echo_failing_on(failing: &'static [&'static str]) -> Arc<dyn Handler> {
    FnHandler::shared(move |data: Vec<u8>| async move {
        if failing.iter().any(|payload| payload.as_bytes() == data.as_slice()) {
            return Err(MessagingError::handler(format!(
                "rejected {}",
                String::from_utf8_lossy(&data)
            )));
        }
        Ok(Some(RawMessage::new(data).boxed()))
    })
}

pub fn echo() -> Arc<dyn Handler> {
    echo_failing_on(&[])
}

pub fn payloads(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

/// Sorted UTF-8 payloads for order-independent comparison
pub fn sorted_strings(payloads: Vec<bytes::Bytes>) -> Vec<String> {
    let mut out: Vec<String> = payloads
        .into_iter()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .collect();
    out.sort();
    out
}
