pub mod engine;
pub mod scheduler;

pub use engine::{CycleOutcome, CycleSummary, SyncEngine};
pub use scheduler::Scheduler;
