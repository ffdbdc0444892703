//! Function invocation: routing a topic to gateway functions and reporting
//! the outcome back to a subscriber.

pub mod gateway;
pub mod topic_map;
pub mod traits;

pub use gateway::{build_gateway_client, BasicAuth, GatewayInvoker};
pub use topic_map::TopicMap;
pub use traits::{InvocationOutcome, Invoker, OutcomeSubscriber};
