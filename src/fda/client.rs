use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::FdaConfig,
    error::{RecallError, Result},
    fda::types::{EnforcementResponse, RecallRecord},
};

/// Records parsed from one upstream query.
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub records: Vec<RecallRecord>,
    /// Result documents dropped because they had no usable `recall_number`
    pub skipped: usize,
}

impl FetchedBatch {
    /// Keeps the documents that can be keyed, counting the rest.
    pub fn from_results(results: Vec<serde_json::Value>) -> Self {
        let mut batch = Self::default();

        for value in results {
            match RecallRecord::from_value(value) {
                Some(record) => batch.records.push(record),
                None => {
                    warn!("Skipping result without a recall_number");
                    batch.skipped += 1;
                }
            }
        }

        batch
    }
}

/// Source of recall records. One call is one network attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecallSource: Send + Sync {
    async fn fetch_recalls(&self) -> Result<FetchedBatch>;
}

/// Client for the openFDA food enforcement endpoint.
#[derive(Clone)]
pub struct FdaClient {
    client: Client,
    endpoint: String,
    search: String,
    limit: u32,
}

impl FdaClient {
    pub fn new(config: &FdaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("recall-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            search: config.search.clone(),
            limit: config.limit,
        })
    }
}

#[async_trait]
impl RecallSource for FdaClient {
    #[instrument(level = "info", skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_recalls(&self) -> Result<FetchedBatch> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("search", self.search.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecallError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EnforcementResponse = response.json().await?;
        match payload.total() {
            Some(total) => info!(
                "Upstream returned {} results ({} matching in total)",
                payload.results.len(),
                total
            ),
            None => info!("Upstream returned {} results", payload.results.len()),
        }

        let batch = FetchedBatch::from_results(payload.results);
        for record in &batch.records {
            debug!(
                recall_number = record.recall_number().unwrap_or_default(),
                product = record.product_description().unwrap_or("-"),
                reason = record.reason_for_recall().unwrap_or("-"),
                "Fetched recall"
            );
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_counts_unkeyed_results() {
        let batch = FetchedBatch::from_results(vec![
            json!({"recall_number": "F-1"}),
            json!({"product_description": "no key"}),
            json!("not an object"),
            json!({"recall_number": "F-2"}),
        ]);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 2);
    }
}
