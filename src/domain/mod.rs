// Domain-specific error types
pub mod errors;

// Port interfaces
pub mod ports;

// Readiness latch
pub mod readiness;

// Write-once metrics sink slot
pub mod sink_handle;

// Payloads and lifecycle phases
pub mod types;
