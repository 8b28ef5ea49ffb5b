pub mod client;
pub mod types;

pub use client::{FdaClient, FetchedBatch, RecallSource};
pub use types::{EnforcementResponse, RecallRecord};
