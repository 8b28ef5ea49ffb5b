pub mod db;
pub mod models;

pub use db::Database;
pub use models::{RunStatus, StoreStats, SyncRun, Trigger, UpsertOutcome, UpsertSummary};
