//! Ephemeral import broker client adapter.
//!
//! Implements [`pipeline::ImportBroker`]: asks the broker to stage a
//! time-limited import for a destination that has no write API, and returns
//! the link the user opens to pull the content in.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Every failure here surfaces as
//! [`pipeline::DeliveryError::Broker`]; the import strategy in the
//! orchestrator recovers from it with a demo link, so nothing in this crate
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AccessToken, DeliveryError, ImportBroker, ImportRequest, ImportTicket, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8787/functions/v1/import-broker".to_string(),
            api_key_env: Some("BROKER_API_KEY".to_string()),
            timeout_secs: 15,
        }
    }
}

/// Broker answer. Older broker builds wrap the ticket in `{success, data}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BrokerResponse {
    Wrapped {
        success: bool,
        #[serde(default)]
        data: Option<TicketBody>,
        #[serde(default)]
        error: Option<String>,
    },
    Bare(TicketBody),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketBody {
    import_url: String,
    expires_at: Timestamp,
    delivery_id: String,
}

impl From<TicketBody> for ImportTicket {
    fn from(body: TicketBody) -> Self {
        ImportTicket {
            import_url: body.import_url,
            expires_at: body.expires_at,
            delivery_id: body.delivery_id,
        }
    }
}

pub struct HttpImportBroker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<AccessToken>,
    timeout: Duration,
}

impl HttpImportBroker {
    pub fn new(config: &BrokerConfig, api_key: Option<AccessToken>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ImportBroker for HttpImportBroker {
    #[instrument(skip(self, request), fields(destination = request.destination.as_str(), target_id = %request.target_id))]
    async fn request_import(&self, request: &ImportRequest) -> Result<ImportTicket, DeliveryError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.secret());
        }

        let response = builder.send().await.map_err(|e| broker_error(format!("request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| broker_error(format!("failed to read response: {e}")))?;

        let ticket = parse_import_response(status, &body)?;
        info!(broker_delivery_id = %ticket.delivery_id, expires_at = %ticket.expires_at, "Import staged");
        Ok(ticket)
    }
}

/// # Errors
///
/// [`DeliveryError::Broker`] for non-2xx statuses, `success: false`, and
/// bodies that do not describe a ticket.
pub fn parse_import_response(status: u16, body: &str) -> Result<ImportTicket, DeliveryError> {
    if !(200..300).contains(&status) {
        let excerpt: String = body.chars().take(200).collect();
        return Err(broker_error(format!("broker returned {status}: {excerpt}")));
    }

    match serde_json::from_str::<BrokerResponse>(body) {
        Ok(BrokerResponse::Bare(ticket)) => Ok(ticket.into()),
        Ok(BrokerResponse::Wrapped {
            success: true,
            data: Some(ticket),
            ..
        }) => Ok(ticket.into()),
        Ok(BrokerResponse::Wrapped { error, .. }) => Err(broker_error(
            error.unwrap_or_else(|| "broker declined the import".to_string()),
        )),
        Err(e) => Err(broker_error(format!("malformed broker response: {e}"))),
    }
}

fn broker_error(message: impl Into<String>) -> DeliveryError {
    DeliveryError::Broker {
        message: message.into(),
    }
}
