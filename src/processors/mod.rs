//! The consume → dispatch → acknowledge pipeline.
//!
//! [`MessageProcessor`] polls the queue and hands every message to the
//! invoker together with a [`CorrelationContext`]. The invoker later returns
//! the context inside an outcome, which [`ResponseProcessor`] turns into a
//! delete (success) or an immediate visibility reset (failure).

pub mod context;
pub mod message;
pub mod response;
#[cfg(test)]
pub(crate) mod testing;

pub use context::CorrelationContext;
pub use message::{routing_key, MessageProcessor, PollCycle, TOPIC_ATTRIBUTE};
pub use response::{Resolution, ResponseProcessor};
