use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{fda::RecallRecord, server::error::ApiError, storage::Trigger};

use super::state::AppState;

pub const WELCOME: &str = "Welcome to the FDA Recall API";
pub const UPDATE_ACK: &str = "Recall update triggered";

#[derive(Debug, Serialize, Deserialize)]
pub struct RecallsResponse {
    pub recalls: Vec<RecallRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn index_handler() -> &'static str {
    WELCOME
}

pub async fn recalls_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecallsResponse>, ApiError> {
    let recalls = state
        .database
        .lock()
        .await
        .get_recalls(Some(state.config.server.max_listed))?;

    Ok(Json(RecallsResponse { recalls }))
}

pub async fn recall_handler(
    State(state): State<Arc<AppState>>,
    Path(recall_number): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.database.lock().await.get_recall(&recall_number)?;

    record
        .map(|r| Json(r.into_value()))
        .ok_or(ApiError::NotFound(recall_number))
}

/// Runs one fetch cycle inline. The acknowledgment is the same whether the
/// cycle succeeded or not; failures only show up in the logs and run history.
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<MessageResponse>) {
    state.engine.trigger(Trigger::ManualHttp).await;

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: UPDATE_ACK.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        error::RecallError,
        fda::{client::MockRecallSource, FetchedBatch},
        storage::Database,
        sync::SyncEngine,
    };
    use axum::response::IntoResponse;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    fn state_with(config: Config, source: MockRecallSource) -> (TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recalls.db");
        let db = Arc::new(Mutex::new(Database::new(path.to_str().unwrap()).unwrap()));
        let engine = Arc::new(SyncEngine::new(Arc::new(source), db));
        (dir, AppState::new(config, engine))
    }

    fn state(source: MockRecallSource) -> (TempDir, Arc<AppState>) {
        state_with(Config::default(), source)
    }

    #[tokio::test]
    async fn test_index_greets() {
        assert_eq!(index_handler().await, WELCOME);
    }

    #[tokio::test]
    async fn test_update_then_read() {
        let mut source = MockRecallSource::new();
        source.expect_fetch_recalls().returning(|| {
            Ok(FetchedBatch::from_results(vec![
                json!({"recall_number": "F-2", "reason_for_recall": "Undeclared milk"}),
                json!({"recall_number": "F-1", "reason_for_recall": "Listeria"}),
            ]))
        });
        let (_dir, state) = state(source);

        let (status, Json(ack)) = update_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack.message, UPDATE_ACK);

        let Json(body) = recalls_handler(State(state.clone())).await.unwrap();
        let numbers: Vec<&str> = body.recalls.iter().filter_map(|r| r.recall_number()).collect();
        assert_eq!(numbers, vec!["F-1", "F-2"]);

        let Json(one) = recall_handler(State(state), Path("F-2".to_string()))
            .await
            .unwrap();
        assert_eq!(one["reason_for_recall"], "Undeclared milk");
    }

    #[tokio::test]
    async fn test_update_acknowledges_network_failure() {
        let mut source = MockRecallSource::new();
        source.expect_fetch_recalls().returning(|| {
            Err(RecallError::Other(anyhow::anyhow!("connection refused")))
        });
        let (_dir, state) = state(source);

        let (status, Json(ack)) = update_handler(State(state.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack.message, UPDATE_ACK);
        let Json(body) = recalls_handler(State(state)).await.unwrap();
        assert!(body.recalls.is_empty());
    }

    #[tokio::test]
    async fn test_missing_recall_is_404() {
        let (_dir, state) = state(MockRecallSource::new());

        let err = recall_handler(State(state), Path("F-404".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(ref n) if n == "F-404"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_endpoint_respects_cap() {
        let mut config = Config::default();
        config.server.max_listed = 2;
        let (_dir, state) = state_with(config, MockRecallSource::new());
        for n in ["F-1", "F-2", "F-3"] {
            state
                .database
                .lock()
                .await
                .upsert_recall(&RecallRecord::from_value(json!({"recall_number": n})).unwrap())
                .unwrap();
        }

        let Json(body) = recalls_handler(State(state)).await.unwrap();

        assert_eq!(body.recalls.len(), 2);
    }
}
