//! Application layer - port definitions the orchestrator depends on.

pub mod ports;
