//! # Messaging Module
//!
//! Message types, collaborator contracts (source, consumer, handler, sink) and
//! the errors they raise. In-memory implementations live in [`in_memory`].

pub mod errors;
pub mod in_memory;
pub mod message;
pub mod traits;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{ChannelSource, RecordingSink, VecSource};
pub use message::{BoxMessage, Message, RawMessage};
pub use traits::{Consumer, FnHandler, Handler, Sink, Source};

/// Delivery handle passed to [`Consumer::iterate`]
pub use crate::pipeline::Inbox;
