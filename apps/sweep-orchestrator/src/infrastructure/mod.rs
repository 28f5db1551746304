//! Infrastructure Layer
//!
//! Adapters for the ports the orchestrator drives:
//!
//! - `engine/`: trial engine running an external program per trial
//! - `sheets/`: remote sheet sink over the Sheets values REST API
//! - `output/`: local CSV dump of the final table

pub mod engine;
pub mod output;
pub mod sheets;
