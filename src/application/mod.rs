// Control surface (hello / flush)
pub mod control;

// Platform log ingestion
pub mod log_relay;

mod response;
pub mod server;

// Daemon orchestrator and shutdown
pub mod system;
