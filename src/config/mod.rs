pub mod schema;

pub use schema::{Config, DispatchConfig, GatewayConfig, QueueConfig};
