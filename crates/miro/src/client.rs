//! Miro REST v2 board client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline::{
    AccessToken, ApiError, BatchOutcome, BatchSummary, BoardAccess, BoardClient,
    BoardClientFactory, CreatedItem, DeliveryError, DeliveryItem, DirectApiKind, FailedItem,
    ItemKind, RemoteItemId, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::rate_limit::RateLimitState;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Collaboration policy value under which only owners and co-owners may start
/// collaboration tools. Treated as read-only for the connected actor.
const OWNERS_ONLY_POLICY: &str = "board_owners_and_coowners";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiroConfig {
    pub base_url: String,
    /// Pause between consecutive item-creation calls.
    pub item_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for MiroConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.miro.com/v2".to_string(),
            item_delay_ms: 100,
            timeout_secs: 30,
        }
    }
}

impl MiroConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A [`BoardClient`] bound to one access token.
///
/// Requests are throttled against the last rate-limit window the API
/// reported; every non-2xx response becomes a [`DeliveryError::Api`].
pub struct MiroClient {
    transport: Arc<dyn HttpTransport>,
    token: AccessToken,
    config: MiroConfig,
    rate: Mutex<RateLimitState>,
}

impl MiroClient {
    pub fn new(transport: Arc<dyn HttpTransport>, token: AccessToken, config: MiroConfig) -> Self {
        Self {
            transport,
            token,
            config,
            rate: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn rate_limit(&self) -> RateLimitState {
        self.rate.lock().clone()
    }

    /// Sends `request`, throttling first and refreshing the rate-limit window
    /// afterwards. Non-2xx responses are normalized with `context`.
    async fn send(&self, request: HttpRequest, context: &str) -> Result<Value, DeliveryError> {
        self.throttle().await;

        let response = self.transport.send(&request, &self.token).await?;
        self.rate.lock().refresh(&response);

        if !response.is_success() {
            return Err(DeliveryError::Api(normalize_error(&response, context)));
        }
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| {
            DeliveryError::transient(format!("Malformed response while attempting to {context}: {e}"))
        })
    }

    async fn throttle(&self) {
        let now = Timestamp::now().as_datetime().timestamp_millis();
        let wait = self.rate.lock().wait_before_next(now);
        if let Some(wait) = wait {
            warn!(wait_ms = wait.as_millis() as u64, "Rate limit headroom exhausted, waiting for reset");
            tokio::time::sleep(wait).await;
            self.rate.lock().window_elapsed();
        }
    }

    async fn create_item(&self, target_id: &str, item: &DeliveryItem) -> Result<RemoteItemId, DeliveryError> {
        let (endpoint, body) = item_request(item);
        let url = format!("{}/boards/{}/{}", self.config.base_url, target_id, endpoint);
        let context = format!("create {} on board {}", endpoint.trim_end_matches('s'), target_id);

        let created = self.send(HttpRequest::post(url, body), &context).await?;
        created
            .get("id")
            .and_then(|id| match id {
                Value::String(s) => RemoteItemId::new(s.as_str()),
                Value::Number(n) => RemoteItemId::new(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                DeliveryError::transient(format!("Response to {context} carried no item id"))
            })
    }
}

#[async_trait]
impl BoardClient for MiroClient {
    #[instrument(skip(self), fields(board_id = %target_id))]
    async fn validate_board_access(&self, target_id: &str) -> Result<BoardAccess, DeliveryError> {
        let url = format!("{}/boards/{}", self.config.base_url, target_id);
        let board = match self.send(HttpRequest::get(url), &format!("read board {target_id}")).await {
            Ok(board) => board,
            Err(DeliveryError::Api(api)) => return classify_access_failure(target_id, api),
            Err(other) => return Err(other),
        };

        let policy = board
            .pointer("/policy/permissionsPolicy/collaborationToolsStartAccess")
            .and_then(Value::as_str);
        let access = if policy == Some(OWNERS_ONLY_POLICY) {
            BoardAccess {
                can_read: true,
                can_write: false,
                reason: Some(
                    "the board restricts collaboration tools to its owners and co-owners"
                        .to_string(),
                ),
            }
        } else {
            BoardAccess {
                can_read: true,
                can_write: true,
                reason: None,
            }
        };
        debug!(can_write = access.can_write, "Board access checked");
        Ok(access)
    }

    #[instrument(skip(self, items), fields(board_id = %target_id, total = items.len()))]
    async fn create_items(
        &self,
        target_id: &str,
        items: &[DeliveryItem],
    ) -> Result<BatchOutcome, DeliveryError> {
        let mut outcome = BatchOutcome {
            summary: BatchSummary {
                total: items.len(),
                ..BatchSummary::default()
            },
            ..BatchOutcome::default()
        };

        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.item_delay()).await;
            }
            match self.create_item(target_id, item).await {
                Ok(remote_id) => outcome.success.push(CreatedItem {
                    item_id: item.id.clone(),
                    remote_id,
                }),
                Err(error) if error.is_auth() => {
                    warn!(item_id = %item.id, %error, "Credentials rejected, aborting batch");
                    return Err(DeliveryError::AuthFailure {
                        message: error.to_string(),
                    });
                }
                Err(error) => {
                    warn!(item_id = %item.id, %error, "Item creation failed, continuing");
                    outcome.failed.push(FailedItem {
                        item_id: item.id.to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }

        outcome.summary.successful = outcome.success.len();
        outcome.summary.failed = outcome.failed.len();
        info!(
            successful = outcome.summary.successful,
            failed = outcome.summary.failed,
            "Batch finished"
        );
        Ok(outcome)
    }
}

/// Maps a board-read failure onto read/permission/auth/unknown buckets.
fn classify_access_failure(target_id: &str, api: ApiError) -> Result<BoardAccess, DeliveryError> {
    match api.status {
        401 => Err(DeliveryError::AuthFailure {
            message: "the Miro access token is invalid or has expired; reconnect Miro".to_string(),
        }),
        403 => Ok(BoardAccess {
            can_read: false,
            can_write: false,
            reason: Some("the board is not shared with the connected Miro account".to_string()),
        }),
        404 => Err(DeliveryError::NotFound {
            what: "Board".to_string(),
            id: target_id.to_string(),
        }),
        _ => Err(DeliveryError::Api(api)),
    }
}

/// Endpoint segment and JSON body for one item.
fn item_request(item: &DeliveryItem) -> (&'static str, Value) {
    let position = json!({ "x": item.position.x, "y": item.position.y, "origin": "center" });
    match item.kind {
        ItemKind::Sticky => {
            let mut style = json!({});
            if let Some(fill) = &item.style.fill_color {
                style["fillColor"] = json!(fill);
            }
            (
                "sticky_notes",
                json!({
                    "data": { "content": item.text, "shape": "square" },
                    "style": style,
                    "position": position,
                    "geometry": { "width": item.size.width },
                }),
            )
        }
        ItemKind::Text => {
            let mut style = json!({});
            if let Some(color) = &item.style.color {
                style["color"] = json!(color);
            }
            if let Some(size) = item.style.font_size {
                style["fontSize"] = json!(size.to_string());
            }
            (
                "texts",
                json!({
                    "data": { "content": item.text },
                    "style": style,
                    "position": position,
                    "geometry": { "width": item.size.width },
                }),
            )
        }
        ItemKind::Shape => {
            let mut style = json!({});
            if let Some(fill) = &item.style.fill_color {
                style["fillColor"] = json!(fill);
            }
            if let Some(color) = &item.style.color {
                style["color"] = json!(color);
            }
            (
                "shapes",
                json!({
                    "data": { "content": item.text, "shape": "rectangle" },
                    "style": style,
                    "position": position,
                    "geometry": { "width": item.size.width, "height": item.size.height },
                }),
            )
        }
    }
}

/// Normalizes any non-2xx response into [`ApiError`].
pub fn normalize_error(response: &HttpResponse, context: &str) -> ApiError {
    let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
    let code = body
        .get("code")
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| status_code_name(response.status).to_string());
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Miro API returned {}", response.status));
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    ApiError {
        status: response.status,
        code,
        message,
        context: context.to_string(),
        retry_after,
    }
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "badRequest",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "notFound",
        408 => "requestTimeout",
        409 => "conflict",
        429 => "tooManyRequests",
        500..=599 => "serverError",
        _ => "unknown",
    }
}

/// Builds [`MiroClient`]s over a shared transport.
pub struct MiroClientFactory {
    transport: Arc<dyn HttpTransport>,
    config: MiroConfig,
}

impl MiroClientFactory {
    pub fn new(transport: Arc<dyn HttpTransport>, config: MiroConfig) -> Self {
        Self { transport, config }
    }
}

impl BoardClientFactory for MiroClientFactory {
    fn connect(
        &self,
        kind: DirectApiKind,
        token: AccessToken,
    ) -> Result<Arc<dyn BoardClient>, DeliveryError> {
        match kind {
            DirectApiKind::Miro => Ok(Arc::new(MiroClient::new(
                Arc::clone(&self.transport),
                token,
                self.config.clone(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::Method;
    use pipeline::{ItemId, ItemStyle, Position, RetryPolicy, Size};
    use tokio::time::Instant;

    fn item(n: usize, kind: ItemKind) -> DeliveryItem {
        DeliveryItem {
            id: ItemId::for_index(n - 1),
            kind,
            text: format!("Item {n}"),
            style: ItemStyle {
                fill_color: Some("light_yellow".into()),
                ..ItemStyle::default()
            },
            position: Position { x: 0.0, y: 0.0 },
            size: Size {
                width: 200.0,
                height: 200.0,
            },
        }
    }

    fn client(transport: Arc<MockTransport>) -> MiroClient {
        MiroClient::new(
            transport,
            AccessToken::new("token"),
            MiroConfig {
                base_url: "https://miro.test/v2".into(),
                ..MiroConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn items_are_created_in_order_with_a_fixed_gap() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push_json(201, json!({ "id": "r1" }))
            .push_json(201, json!({ "id": 3458764 }))
            .push_json(201, json!({ "id": "r3" }));
        let items = [
            item(1, ItemKind::Text),
            item(2, ItemKind::Sticky),
            item(3, ItemKind::Shape),
        ];

        let outcome = client(transport.clone()).create_items("b1", &items).await.unwrap();

        assert_eq!(outcome.summary, BatchSummary { total: 3, successful: 3, failed: 0 });
        assert_eq!(outcome.success[1].remote_id.as_str(), "3458764");
        let calls = transport.calls();
        let urls = calls.iter().map(|c| c.request.url.as_str()).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://miro.test/v2/boards/b1/texts",
                "https://miro.test/v2/boards/b1/sticky_notes",
                "https://miro.test/v2/boards/b1/shapes",
            ]
        );
        assert!(calls.iter().all(|c| c.request.method == Method::Post));
        for pair in calls.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(100));
        }
        let sticky = calls[1].request.body.as_ref().unwrap();
        assert_eq!(sticky["style"]["fillColor"], "light_yellow");
        assert_eq!(sticky["data"]["content"], "Item 2");
    }

    #[tokio::test(start_paused = true)]
    async fn non_auth_failures_are_recorded_and_skipped() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push_json(201, json!({ "id": "r1" }))
            .push_json(400, json!({ "code": "invalidParameters", "message": "Bad color" }))
            .push_json(201, json!({ "id": "r3" }));
        let items = [
            item(1, ItemKind::Sticky),
            item(2, ItemKind::Sticky),
            item(3, ItemKind::Sticky),
        ];

        let outcome = client(transport).create_items("b1", &items).await.unwrap();

        assert_eq!(outcome.summary, BatchSummary { total: 3, successful: 2, failed: 1 });
        assert_eq!(outcome.failed[0].item_id, "item-2");
        assert!(outcome.failed[0].message.contains("Bad color"), "{}", outcome.failed[0].message);
        assert!(outcome.failed[0].message.contains("400 invalidParameters"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_item_failure_does_not_stop_the_batch() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push_json(201, json!({ "id": "r1" }))
            .push_json(201, json!({ "id": "r2" }))
            .push_json(503, json!({ "message": "Service Unavailable" }))
            .push_json(201, json!({ "id": "r4" }))
            .push_json(201, json!({ "id": "r5" }));
        let items = (1..=5).map(|n| item(n, ItemKind::Sticky)).collect::<Vec<_>>();

        let outcome = client(transport.clone()).create_items("b1", &items).await.unwrap();

        assert_eq!(outcome.summary, BatchSummary { total: 5, successful: 4, failed: 1 });
        assert_eq!(outcome.failed[0].item_id, "item-3");
        assert!(outcome.failed[0].message.contains("503 serverError"), "{}", outcome.failed[0].message);
        let created = outcome
            .success
            .iter()
            .map(|c| c.remote_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(created, vec!["r1", "r2", "r4", "r5"]);
        assert_eq!(transport.calls().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_aborts_the_remaining_batch() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(401, json!({ "message": "Token expired" }));
        let items = (1..=5).map(|n| item(n, ItemKind::Sticky)).collect::<Vec<_>>();

        let err = client(transport.clone()).create_items("b1", &items).await.unwrap_err();

        assert!(matches!(err, DeliveryError::AuthFailure { .. }), "{err:?}");
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn low_headroom_waits_for_the_window_to_reset() {
        let reset = Timestamp::now().as_datetime().timestamp() + 30;
        let transport = Arc::new(MockTransport::new());
        transport
            .push_with_headers(
                201,
                json!({ "id": "r1" }),
                &[
                    ("X-RateLimit-Remaining", "3".to_string()),
                    ("X-RateLimit-Reset", reset.to_string()),
                    ("X-RateLimit-Limit", "100".to_string()),
                ],
            )
            .push_json(201, json!({ "id": "r2" }));
        let client = client(transport.clone());
        let started = Instant::now();

        client
            .create_items("b1", &[item(1, ItemKind::Sticky), item(2, ItemKind::Sticky)])
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].at - started >= Duration::from_secs(28), "{:?}", calls[1].at - started);
        assert_eq!(client.rate_limit().limit, Some(100));
    }

    #[tokio::test]
    async fn owners_only_policy_is_read_only() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({
                "id": "b1",
                "policy": { "permissionsPolicy": { "collaborationToolsStartAccess": OWNERS_ONLY_POLICY } }
            }),
        );

        let access = client(transport.clone()).validate_board_access("b1").await.unwrap();

        assert!(access.can_read);
        assert!(!access.can_write);
        assert!(access.reason.is_some());
        assert_eq!(transport.calls()[0].request.method, Method::Get);
    }

    #[tokio::test]
    async fn open_board_is_writable() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({ "policy": { "permissionsPolicy": { "collaborationToolsStartAccess": "all_editors" } } }),
        );
        let access = client(transport).validate_board_access("b1").await.unwrap();
        assert!(access.can_write);
    }

    #[tokio::test]
    async fn access_failures_are_bucketed() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push_json(401, json!({}))
            .push_json(403, json!({}))
            .push_json(404, json!({}))
            .push_json(503, json!({ "message": "Maintenance" }));
        let client = client(transport);

        assert!(matches!(
            client.validate_board_access("b1").await,
            Err(DeliveryError::AuthFailure { .. })
        ));
        let forbidden = client.validate_board_access("b1").await.unwrap();
        assert!(!forbidden.can_read && !forbidden.can_write);
        assert!(matches!(
            client.validate_board_access("b1").await,
            Err(DeliveryError::NotFound { .. })
        ));
        let unknown = client.validate_board_access("b1").await.unwrap_err();
        assert!(unknown.retry_policy().is_retryable());
    }

    #[test]
    fn errors_are_normalized_with_retry_hint() {
        let response = HttpResponse {
            status: 429,
            headers: [("retry-after".to_string(), "12".to_string())].into(),
            body: String::new(),
        };

        let api = normalize_error(&response, "create sticky_note on board b1");

        assert_eq!(api.code, "tooManyRequests");
        assert_eq!(api.context, "create sticky_note on board b1");
        assert_eq!(
            api.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(12))
            }
        );
    }
}
