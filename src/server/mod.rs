//! HTTP surface over the recall store.
//!
//! - `GET /` greeting
//! - `GET /data` every stored recall, ordered by recall number
//! - `GET /data/:recall_number` one stored recall
//! - `GET|POST /update` runs a fetch cycle and acknowledges it
use std::{sync::Arc, time::Duration};

use axum::{
    http::{header::HeaderValue, Method},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c, sync::watch};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::info;

pub mod error;
pub mod routes;
pub mod state;

use crate::error::{RecallError, Result};
use routes::{index_handler, recall_handler, recalls_handler, update_handler};
pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let origins = state
        .config
        .server
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| RecallError::Config(format!("Invalid CORS origin {origin}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::any())
        .max_age(Duration::from_secs(60 * 60));

    Ok(Router::new()
        .route("/", get(index_handler))
        .route("/data", get(recalls_handler))
        .route("/data/:recall_number", get(recall_handler))
        .route("/update", get(update_handler).post(update_handler))
        .layer(cors)
        .with_state(state))
}

/// Serves until Ctrl+C or SIGTERM, then flips `shutdown` so background tasks
/// stop too.
pub async fn start_server(state: Arc<AppState>, shutdown: watch::Sender<bool>) -> Result<()> {
    let app = build_router(state.clone())?;

    let address = state.config.bind_address();
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown.send(true);
        })
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, fda::client::MockRecallSource, storage::Database, sync::SyncEngine};
    use tokio::sync::Mutex;

    #[test]
    fn test_invalid_origin_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recalls.db");
        let db = Arc::new(Mutex::new(Database::new(path.to_str().unwrap()).unwrap()));
        let engine = Arc::new(SyncEngine::new(Arc::new(MockRecallSource::new()), db));
        let mut config = Config::default();
        config.server.allowed_origins = vec!["http://bad\norigin".to_string()];

        let result = build_router(AppState::new(config, engine));

        assert!(matches!(result, Err(RecallError::Config(_))));
    }
}
