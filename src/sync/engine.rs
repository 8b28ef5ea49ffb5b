use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::Result,
    fda::RecallSource,
    storage::{Database, RunStatus, SyncRun, Trigger, UpsertSummary},
};

/// Counts for one completed fetch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub upserts: UpsertSummary,
}

/// Outcome of a trigger. Failures are carried as text, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    Failed(String),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Fetch-then-upsert routine shared by the scheduler and manual triggers
pub struct SyncEngine {
    source: Arc<dyn RecallSource>,
    database: Arc<Mutex<Database>>,
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn RecallSource>, database: Arc<Mutex<Database>>) -> Self {
        Self {
            source,
            database,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.database.clone()
    }

    /// One fetch cycle. Cycles never overlap: a second caller waits for the
    /// running one, then runs its own.
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<CycleSummary> {
        let _guard = self.cycle_lock.lock().await;
        let started_at = Utc::now();
        info!("Running fetch cycle ({})", trigger);

        let result = self.fetch_and_upsert().await;

        let run = match &result {
            Ok(summary) => SyncRun {
                id: 0,
                trigger,
                started_at,
                finished_at: Utc::now(),
                status: RunStatus::Succeeded,
                fetched: summary.fetched,
                skipped: summary.skipped,
                upserts: summary.upserts,
                error: None,
            },
            Err(e) => SyncRun {
                id: 0,
                trigger,
                started_at,
                finished_at: Utc::now(),
                status: RunStatus::Failed,
                fetched: 0,
                skipped: 0,
                upserts: UpsertSummary::default(),
                error: Some(e.to_string()),
            },
        };

        if let Err(e) = self.database.lock().await.save_sync_run(&run) {
            warn!("Failed to record fetch cycle: {}", e);
        }

        result
    }

    async fn fetch_and_upsert(&self) -> Result<CycleSummary> {
        let batch = self.source.fetch_recalls().await?;

        let mut summary = CycleSummary {
            fetched: batch.records.len(),
            skipped: batch.skipped,
            upserts: UpsertSummary::default(),
        };

        if batch.records.is_empty() {
            info!("No recalls returned, nothing to store");
            return Ok(summary);
        }

        summary.upserts = self.database.lock().await.upsert_recalls(&batch.records)?;

        info!(
            "Fetch cycle complete: {} fetched, {} inserted, {} replaced, {} unchanged",
            summary.fetched,
            summary.upserts.inserted,
            summary.upserts.replaced,
            summary.upserts.unchanged
        );

        Ok(summary)
    }

    /// Best-effort cycle: any failure is logged and returned as a value.
    pub async fn trigger(&self, trigger: Trigger) -> CycleOutcome {
        match self.run_cycle(trigger).await {
            Ok(summary) => CycleOutcome::Completed(summary),
            Err(e) => {
                error!("Fetch cycle ({}) failed: {}", trigger, e);
                CycleOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RecallError,
        fda::{client::MockRecallSource, FetchedBatch, RecallRecord},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tempfile::TempDir;

    /// Source that holds each fetch open for a while and tracks overlap.
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RecallSource for SlowSource {
        async fn fetch_recalls(&self) -> Result<FetchedBatch> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchedBatch::from_results(vec![json!({"recall_number": "F-1"})]))
        }
    }

    fn database() -> (TempDir, Arc<Mutex<Database>>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recalls.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        (dir, Arc::new(Mutex::new(db)))
    }

    fn batch(values: Vec<serde_json::Value>) -> FetchedBatch {
        FetchedBatch::from_results(values)
    }

    #[tokio::test]
    async fn test_cycle_stores_fetched_records() {
        let (_dir, db) = database();
        let mut source = MockRecallSource::new();
        source.expect_fetch_recalls().times(1).returning(|| {
            Ok(batch(vec![
                json!({"recall_number": "F-1", "product_description": "Granola"}),
                json!({"recall_number": "F-2", "product_description": "Hummus"}),
                json!({"product_description": "unkeyed"}),
            ]))
        });

        let engine = SyncEngine::new(Arc::new(source), db.clone());
        let summary = engine.run_cycle(Trigger::ManualCli).await.unwrap();

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.upserts.inserted, 2);

        let db = db.lock().await;
        assert_eq!(db.count_recalls().unwrap(), 2);
        let runs = db.get_sync_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
        assert_eq!(runs[0].trigger, Trigger::ManualCli);
    }

    #[tokio::test]
    async fn test_empty_fetch_writes_nothing() {
        let (_dir, db) = database();
        let mut source = MockRecallSource::new();
        source
            .expect_fetch_recalls()
            .returning(|| Ok(FetchedBatch::default()));

        let engine = SyncEngine::new(Arc::new(source), db.clone());
        let outcome = engine.trigger(Trigger::Scheduled).await;

        assert_eq!(outcome, CycleOutcome::Completed(CycleSummary::default()));
        assert_eq!(db.lock().await.count_recalls().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_store_untouched() {
        let (_dir, db) = database();
        db.lock()
            .await
            .upsert_recall(&RecallRecord::from_value(json!({"recall_number": "F-OLD"})).unwrap())
            .unwrap();

        let mut source = MockRecallSource::new();
        source.expect_fetch_recalls().returning(|| {
            Err(RecallError::UpstreamStatus {
                status: 503,
                body: "unavailable".to_string(),
            })
        });

        let engine = SyncEngine::new(Arc::new(source), db.clone());
        let outcome = engine.trigger(Trigger::ManualHttp).await;

        assert!(!outcome.is_success());
        let db = db.lock().await;
        let stored = db.get_recalls(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].recall_number(), Some("F-OLD"));

        let runs = db.get_sync_runs(5).unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        let (_dir, db) = database();
        db.lock()
            .await
            .connection()
            .execute_batch("DROP TABLE recalls")
            .unwrap();

        let mut source = MockRecallSource::new();
        source
            .expect_fetch_recalls()
            .returning(|| Ok(batch(vec![json!({"recall_number": "F-1"})])));

        let engine = SyncEngine::new(Arc::new(source), db.clone());
        let outcome = engine.trigger(Trigger::ManualHttp).await;

        assert!(matches!(outcome, CycleOutcome::Failed(msg) if msg.contains("Database error")));
    }

    #[tokio::test]
    async fn test_second_cycle_replaces_and_keeps_absent() {
        let (_dir, db) = database();
        let mut source = MockRecallSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_fetch_recalls()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(batch(vec![
                    json!({"recall_number": "F-1", "status": "Ongoing"}),
                    json!({"recall_number": "F-2", "status": "Ongoing"}),
                ]))
            });
        source
            .expect_fetch_recalls()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(batch(vec![json!({"recall_number": "F-2", "status": "Terminated"})])));

        let engine = SyncEngine::new(Arc::new(source), db.clone());
        engine.run_cycle(Trigger::Scheduled).await.unwrap();
        let second = engine.run_cycle(Trigger::Scheduled).await.unwrap();

        assert_eq!(second.upserts.replaced, 1);
        let db = db.lock().await;
        assert_eq!(db.count_recalls().unwrap(), 2);
        assert_eq!(
            db.get_recall("F-2").unwrap().unwrap().status(),
            Some("Terminated")
        );
        assert_eq!(db.get_recall("F-1").unwrap().unwrap().status(), Some("Ongoing"));
    }

    #[tokio::test]
    async fn test_overlapping_triggers_run_one_at_a_time() {
        let (_dir, db) = database();
        let source = Arc::new(SlowSource::default());
        let engine = SyncEngine::new(source.clone(), db.clone());

        let (a, b) = tokio::join!(
            engine.trigger(Trigger::Scheduled),
            engine.trigger(Trigger::ManualHttp)
        );

        assert!(a.is_success());
        assert!(b.is_success());
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);

        let db = db.lock().await;
        assert_eq!(db.get_sync_runs(10).unwrap().len(), 2);
        assert_eq!(db.count_recalls().unwrap(), 1);
    }
}
