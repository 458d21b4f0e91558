//! HTTP-backed [`ContentGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    AccessToken, ContentGenerator, DeliveryError, GenerationRequest, TailoredContent,
    TailoringMetadata, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::GeneratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Full URL of the generation endpoint.
    pub endpoint: String,
    /// Environment variable holding the bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8787/functions/v1/generate-content".to_string(),
            api_key_env: Some("GENERATOR_API_KEY".to_string()),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    success: bool,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    metadata: Option<ResponseMetadata>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMetadata {
    #[serde(default)]
    generated_at: Option<Timestamp>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    item_count: Option<usize>,
}

pub struct HttpContentGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<AccessToken>,
    timeout: Duration,
}

impl HttpContentGenerator {
    /// # Errors
    ///
    /// [`GeneratorError::Misconfiguration`] if the HTTP client cannot be built.
    pub fn new(config: &GeneratorConfig, api_key: Option<AccessToken>) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| GeneratorError::Misconfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn call(&self, request: &GenerationRequest) -> Result<TailoredContent, GeneratorError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.secret());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Transport(format!("generator timed out after {}s", self.timeout.as_secs()))
            } else {
                GeneratorError::Transport(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::Transport(format!("failed to read response: {e}")))?;

        parse_generation_response(status, retry_after, &body)
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    async fn generate(&self, request: &GenerationRequest) -> Result<TailoredContent, DeliveryError> {
        match self.call(request).await {
            Ok(content) => {
                debug!(items = content.metadata.item_count, model = ?content.metadata.model, "Content generated");
                Ok(content)
            }
            Err(error) => {
                warn!(%error, "Content generation failed");
                Err(error.into())
            }
        }
    }
}

/// Classifies a generator response.
///
/// # Errors
///
/// Status-based [`GeneratorError`]s for non-2xx responses;
/// [`GeneratorError::Unsuccessful`] for `success: false`;
/// [`GeneratorError::Malformed`] when the body cannot be read as a response
/// or carries no content.
pub fn parse_generation_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<TailoredContent, GeneratorError> {
    match status {
        200..=299 => {}
        401 | 403 => return Err(GeneratorError::Auth { status }),
        429 => return Err(GeneratorError::Quota { retry_after }),
        500..=599 => return Err(GeneratorError::Outage { status, retry_after }),
        _ => {
            return Err(GeneratorError::Status {
                status,
                body: body.chars().take(200).collect(),
            })
        }
    }

    let response: GenerationResponse =
        serde_json::from_str(body).map_err(|e| GeneratorError::Malformed(e.to_string()))?;
    if !response.success {
        return Err(GeneratorError::Unsuccessful(
            response
                .error
                .unwrap_or_else(|| "generator reported failure without a reason".to_string()),
        ));
    }
    let content = response
        .content
        .ok_or_else(|| GeneratorError::Malformed("missing content".to_string()))?;

    let metadata = response.metadata.unwrap_or_default();
    let mut tailored = TailoredContent {
        content,
        metadata: TailoringMetadata {
            generated_at: metadata.generated_at.or_else(|| Some(Timestamp::now())),
            model: metadata.model,
            item_count: 0,
            fallback: false,
        },
    };
    tailored.metadata.item_count = metadata.item_count.unwrap_or(tailored.entries().len());
    Ok(tailored)
}
