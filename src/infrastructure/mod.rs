pub mod log_consumer;
pub mod mock;
pub mod observability;

pub use log_consumer::PlatformLogConsumer;
pub use mock::MockMetricsSink;
