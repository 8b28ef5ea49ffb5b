use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use tracing::debug;

use crate::{
    error::Result,
    fda::RecallRecord,
    storage::models::{
        RunStatus, StoreStats, SyncRun, Trigger, UpsertOutcome, UpsertSummary,
    },
};

/// SQLite-backed document store. One row per `recall_number`, document kept
/// as serialized JSON.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS recalls (
                recall_number TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                triggered_by TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                status TEXT NOT NULL,
                fetched INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                inserted INTEGER NOT NULL,
                replaced INTEGER NOT NULL,
                unchanged INTEGER NOT NULL,
                error TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at)",
            [],
        )?;

        Ok(())
    }

    /// Stores `record` as the whole document for its recall number. An existing
    /// document is replaced, never merged.
    pub fn upsert_recall(&self, record: &RecallRecord) -> Result<UpsertOutcome> {
        let recall_number = record
            .recall_number()
            .ok_or_else(|| anyhow!("record has no recall_number"))?;
        let document = record.to_document()?;

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM recalls WHERE recall_number = ?1",
                [recall_number],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(stored) if stored == document => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };

        self.conn.execute(
            "INSERT OR REPLACE INTO recalls (recall_number, document, updated_at)
             VALUES (?1, ?2, ?3)",
            params![recall_number, document, Utc::now().to_rfc3339()],
        )?;

        debug!("{:?} recall {}", outcome, recall_number);
        Ok(outcome)
    }

    /// Upserts records one at a time. Stops at the first failure; earlier
    /// writes stay persisted.
    pub fn upsert_recalls(&self, records: &[RecallRecord]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for record in records {
            summary.record(self.upsert_recall(record)?);
        }
        Ok(summary)
    }

    /// All stored documents ordered by recall number
    pub fn get_recalls(&self, limit: Option<usize>) -> Result<Vec<RecallRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            "SELECT document FROM recalls
             ORDER BY recall_number
             LIMIT ?1",
        )?;

        let documents = stmt
            .query_map([limit], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|doc| RecallRecord::from_document(doc).map_err(Into::into))
            .collect()
    }

    pub fn get_recall(&self, recall_number: &str) -> Result<Option<RecallRecord>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM recalls WHERE recall_number = ?1",
                [recall_number],
                |row| row.get(0),
            )
            .optional()?;

        Ok(document
            .map(|doc| RecallRecord::from_document(&doc))
            .transpose()?)
    }

    pub fn count_recalls(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM recalls", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn save_sync_run(&self, run: &SyncRun) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_runs
             (triggered_by, started_at, finished_at, status, fetched, skipped,
              inserted, replaced, unchanged, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.trigger.to_string(),
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.status.to_string(),
                run.fetched as i64,
                run.skipped as i64,
                run.upserts.inserted as i64,
                run.upserts.replaced as i64,
                run.upserts.unchanged as i64,
                run.error,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent runs first
    pub fn get_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, triggered_by, started_at, finished_at, status, fetched, skipped,
                    inserted, replaced, unchanged, error
             FROM sync_runs
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;

        let runs = stmt
            .query_map([limit as i64], |row| {
                let trigger: String = row.get(1)?;
                let status: String = row.get(4)?;

                Ok(SyncRun {
                    id: row.get(0)?,
                    trigger: trigger
                        .parse::<Trigger>()
                        .map_err(|e| conversion_error(1, e.into()))?,
                    started_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
                    finished_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
                    status: if status == "succeeded" {
                        RunStatus::Succeeded
                    } else {
                        RunStatus::Failed
                    },
                    fetched: row.get::<_, i64>(5)? as usize,
                    skipped: row.get::<_, i64>(6)? as usize,
                    upserts: UpsertSummary {
                        inserted: row.get::<_, i64>(7)? as usize,
                        replaced: row.get::<_, i64>(8)? as usize,
                        unchanged: row.get::<_, i64>(9)? as usize,
                    },
                    error: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let total_recalls = self.count_recalls()?;

        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(CAST(json_extract(document, '$.classification') AS TEXT), 'Unclassified') AS class,
                    COUNT(*)
             FROM recalls
             GROUP BY class
             ORDER BY class",
        )?;
        let by_classification = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total_runs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_runs", [], |row| row.get(0))?;

        let failed_runs: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_runs WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        let last_success: Option<String> = self.conn.query_row(
            "SELECT MAX(finished_at) FROM sync_runs WHERE status = 'succeeded'",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            total_recalls,
            by_classification,
            total_runs: total_runs as usize,
            failed_runs: failed_runs as usize,
            last_success_at: last_success
                .map(|s| parse_timestamp(0, &s))
                .transpose()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Box::new(e)))
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}
