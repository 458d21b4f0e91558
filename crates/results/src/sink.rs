//! PostgREST-backed [`ResultSink`].

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AccessToken, DeliveryError, DeliveryResult, ResultSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::record::DeliveryRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Table endpoint, e.g. `https://<project>.supabase.co/rest/v1/deliveries`.
    pub table_url: String,
    pub api_key_env: Option<String>,
    /// Environment variable naming the acting user. Unset means anonymous,
    /// and nothing is persisted.
    pub actor_env: String,
    pub timeout_secs: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            table_url: "http://localhost:54321/rest/v1/deliveries".to_string(),
            api_key_env: Some("RESULTS_API_KEY".to_string()),
            actor_env: "PRESENTER_USER_ID".to_string(),
            timeout_secs: 10,
        }
    }
}

pub struct HttpResultSink {
    client: reqwest::Client,
    table_url: String,
    api_key: Option<AccessToken>,
    actor_id: Option<String>,
    timeout: Duration,
}

impl HttpResultSink {
    pub fn new(config: &ResultsConfig, api_key: Option<AccessToken>, actor_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            table_url: config.table_url.clone(),
            api_key,
            actor_id: actor_id.filter(|id| !id.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// The row that would be written, or `None` when there is no actor.
    pub fn record_for(&self, result: &DeliveryResult) -> Option<DeliveryRecord> {
        self.actor_id
            .as_deref()
            .map(|actor| DeliveryRecord::from_result(result, actor))
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    #[instrument(skip(self, result), fields(delivery_id = %result.id))]
    async fn persist(&self, result: &DeliveryResult) -> Result<(), DeliveryError> {
        let Some(record) = self.record_for(result) else {
            debug!("No authenticated actor, skipping persistence");
            return Ok(());
        };

        let mut builder = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .timeout(self.timeout)
            .json(&record);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("apikey", key.secret())
                .bearer_auth(key.secret());
        }

        let response = builder.send().await.map_err(|e| DeliveryError::Persistence {
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Persistence {
                message: format!("{status}: {}", body.chars().take(200).collect::<String>()),
            });
        }

        debug!(status = status.as_u16(), "Delivery result persisted");
        Ok(())
    }
}
