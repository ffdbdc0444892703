pub mod sqs;
pub mod traits;

pub use sqs::SqsQueueClient;
pub use traits::{QueueClient, QueueMessage, ReceiveRequest};
