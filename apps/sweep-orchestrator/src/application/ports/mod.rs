//! Application Ports
//!
//! Interfaces the sweep orchestrator drives. Trial execution is reached
//! through [`crate::sweep::TrialEngine`]; publication through
//! [`RemoteSinkPort`].

mod remote_sink_port;

pub use remote_sink_port::{HEADER_CELL, InMemoryRemoteSink, PROGRESS_CELL, RemoteSinkPort, Rows};
