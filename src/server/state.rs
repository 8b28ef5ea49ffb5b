use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{config::Config, storage::Database, sync::SyncEngine};

pub struct AppState {
    pub config: Config,
    pub database: Arc<Mutex<Database>>,
    pub engine: Arc<SyncEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<SyncEngine>) -> Arc<Self> {
        Arc::new(Self {
            config,
            database: engine.database(),
            engine,
        })
    }
}
