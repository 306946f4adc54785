//! # Message Abstraction
//!
//! The payload type flowing through the pipeline. Sources hand out their own
//! message types (which usually know how to ack/nack against their broker);
//! the pipeline only needs the bytes and the upstream abort flag.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message travelling through the pipeline
pub trait Message: Send + Sync + 'static {
    /// Raw payload bytes
    fn data(&self) -> &[u8];

    /// True when the source already terminally disposed of this message
    /// (acked, nacked, dead-lettered). Aborted messages are never forwarded
    /// to the error sink.
    fn aborted(&self) -> bool {
        false
    }
}

/// Owned, type-erased message
pub type BoxMessage = Box<dyn Message>;

impl fmt::Debug for dyn Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.data().len())
            .field("aborted", &self.aborted())
            .finish()
    }
}

/// Plain byte-payload message
///
/// Used for handler results, for payloads re-wrapped on their way to the error
/// sink, and by the in-memory sources.
#[derive(Debug, Default)]
pub struct RawMessage {
    data: Bytes,
    aborted: AtomicBool,
}

impl RawMessage {
    /// Create a message from a payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            aborted: AtomicBool::new(false),
        }
    }

    /// Create a message copying the payload of another message
    pub fn copy_from(message: &dyn Message) -> Self {
        Self::new(Bytes::copy_from_slice(message.data()))
    }

    /// Mark the message as already disposed upstream
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Builder form of [`RawMessage::abort`]
    pub fn into_aborted(self) -> Self {
        self.abort();
        self
    }

    /// Payload as shared bytes
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Box the message for hand-off to the pipeline
    pub fn boxed(self) -> BoxMessage {
        Box::new(self)
    }
}

impl Clone for RawMessage {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            aborted: AtomicBool::new(self.aborted.load(Ordering::Acquire)),
        }
    }
}

impl Message for RawMessage {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

impl From<&'static str> for RawMessage {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_payload() {
        let message = RawMessage::from("hello");
        assert_eq!(message.data(), b"hello");
        assert!(!message.aborted());
    }

    #[test]
    fn test_abort_flag() {
        let message = RawMessage::from("payload").into_aborted();
        assert!(message.aborted());

        let copy = RawMessage::copy_from(&message);
        assert_eq!(copy.data(), b"payload");
        assert!(!copy.aborted(), "copies start a fresh disposition");

        let cloned = message.clone();
        assert!(cloned.aborted());
    }

    #[test]
    fn test_debug_for_trait_object() {
        let boxed: BoxMessage = RawMessage::from("abc").boxed();
        let rendered = format!("{:?}", boxed.as_ref());
        assert!(rendered.contains("len: 3"));
    }
}
