//! Execution layer: runtime selection, subprocess driving, temp hygiene

pub mod cleaner;
pub mod manager;
pub mod runner;

pub use cleaner::SecureCleaner;
pub use manager::{ExecutionManager, PreparedCommand, RuntimeMode};
pub use runner::{Canceller, ExitStatus, ProcessEvent, ProcessRunner, RunHandle};
