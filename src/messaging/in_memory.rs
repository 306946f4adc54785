//! # In-Memory Collaborators
//!
//! Sources and sinks backed by process memory, for testing and development.
//!
//! - [`ChannelSource`]: fed through an mpsc sender, runs until the sender is
//!   dropped or the worker stops
//! - [`VecSource`]: replays a fixed list, optionally failing afterwards
//! - [`RecordingSink`]: captures produced payloads, optionally failing on demand

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::errors::{MessagingError, MessagingResult};
use super::message::{BoxMessage, Message, RawMessage};
use super::traits::{Consumer, Sink, Source};
use crate::pipeline::{Inbox, RequestContext};

/// Source fed by an in-process channel
///
/// Only the first consumer created receives messages; later consumers find
/// the receiver taken and return immediately.
#[derive(Debug)]
pub struct ChannelSource {
    name: String,
    receiver: Mutex<Option<mpsc::Receiver<BoxMessage>>>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Sender<BoxMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let source = Self {
            name: name.into(),
            receiver: Mutex::new(Some(rx)),
        };
        (source, tx)
    }
}

impl Source for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_consumer(&self) -> Box<dyn Consumer> {
        Box::new(ChannelConsumer {
            receiver: self.receiver.lock().take(),
        })
    }
}

struct ChannelConsumer {
    receiver: Option<mpsc::Receiver<BoxMessage>>,
}

#[async_trait]
impl Consumer for ChannelConsumer {
    async fn iterate(&mut self, inbox: Inbox) -> MessagingResult<()> {
        let Some(receiver) = self.receiver.as_mut() else {
            debug!(source = %inbox.source_name(), "Channel receiver already taken");
            return Ok(());
        };

        loop {
            tokio::select! {
                biased;
                _ = inbox.closed() => return Ok(()),
                next = receiver.recv() => match next {
                    Some(message) => {
                        if inbox.deliver(message).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Source replaying a fixed list of payloads
#[derive(Debug, Clone)]
pub struct VecSource {
    name: String,
    messages: Vec<RawMessage>,
    failure: Option<String>,
}

impl VecSource {
    pub fn new(name: impl Into<String>, messages: Vec<RawMessage>) -> Self {
        Self {
            name: name.into(),
            messages,
            failure: None,
        }
    }

    /// Build from string payloads
    pub fn from_payloads<I, S>(name: impl Into<String>, payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        Self::new(
            name,
            payloads.into_iter().map(RawMessage::new).collect(),
        )
    }

    /// Fail the consumer with this message once every payload was delivered
    pub fn fail_after(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl Source for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_consumer(&self) -> Box<dyn Consumer> {
        Box::new(VecConsumer {
            name: self.name.clone(),
            messages: self.messages.clone(),
            failure: self.failure.clone(),
        })
    }
}

struct VecConsumer {
    name: String,
    messages: Vec<RawMessage>,
    failure: Option<String>,
}

#[async_trait]
impl Consumer for VecConsumer {
    async fn iterate(&mut self, inbox: Inbox) -> MessagingResult<()> {
        for message in self.messages.drain(..) {
            if let Err(e) = inbox.deliver(message.boxed()).await {
                debug!(source = %self.name, error = %e, "Stopped replaying messages");
                return Ok(());
            }
        }

        match self.failure.take() {
            Some(message) => Err(MessagingError::consumer(&self.name, message)),
            None => Ok(()),
        }
    }
}

type FailurePredicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Sink recording every successfully produced payload
pub struct RecordingSink {
    name: String,
    produced: Mutex<Vec<Bytes>>,
    attempts: AtomicUsize,
    fail_when: Option<FailurePredicate>,
}

impl std::fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSink")
            .field("name", &self.name)
            .field("produced", &self.produced.lock().len())
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .field("has_failure_predicate", &self.fail_when.is_some())
            .finish()
    }
}

impl RecordingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            produced: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_when: None,
        }
    }

    /// Reject payloads matching the predicate with a produce error
    pub fn failing_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Payloads produced so far, in production order
    pub fn payloads(&self) -> Vec<Bytes> {
        self.produced.lock().clone()
    }

    /// Number of successfully produced messages
    pub fn produced_count(&self) -> usize {
        self.produced.lock().len()
    }

    /// Number of produce calls, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    /// Wait until at least `count` messages were produced
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.produced_count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _ctx: &RequestContext, message: &dyn Message) -> MessagingResult<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        if let Some(predicate) = &self.fail_when {
            if predicate(message.data()) {
                return Err(MessagingError::produce(&self.name, "rejected by sink"));
            }
        }

        self.produced
            .lock()
            .push(Bytes::copy_from_slice(message.data()));
        Ok(())
    }
}
