//! Trial engine adapters.

mod command;

pub use command::{CommandEngine, CommandEngineConfig};
