pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::log_relay::LogStream;
pub use application::system::{Daemon, ReadinessController};
pub use config::Config;
pub use domain::errors::{DaemonError, RequestError};
pub use domain::ports::MetricsSink;
pub use domain::types::{DaemonPhase, LogPayload};
