use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one record during an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// An identical document was already stored; nothing was written
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Rows actually written
    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Scheduled,
    ManualHttp,
    ManualCli,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::ManualHttp => write!(f, "manual-http"),
            Trigger::ManualCli => write!(f, "manual-cli"),
        }
    }
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Trigger::Scheduled),
            "manual-http" => Ok(Trigger::ManualHttp),
            "manual-cli" => Ok(Trigger::ManualCli),
            other => Err(format!("unknown trigger: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One recorded fetch cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub fetched: usize,
    pub skipped: usize,
    pub upserts: UpsertSummary,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_recalls: usize,
    pub by_classification: Vec<(String, usize)>,
    pub total_runs: usize,
    pub failed_runs: usize,
    pub last_success_at: Option<DateTime<Utc>>,
}
