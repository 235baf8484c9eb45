pub mod carryover;
pub mod config;
pub mod distribute;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod io;
pub mod orchestrator;
pub mod plan;
pub mod profile;
pub mod report;
pub mod selector;
pub mod sim;
pub mod state;
pub mod tips;
pub mod types;
pub mod well;

pub use error::{PipetteError, Result};
