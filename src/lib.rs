pub mod cli;
pub mod config;
pub mod error;
pub mod fda;
pub mod server;
pub mod storage;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use error::{RecallError, Result};
