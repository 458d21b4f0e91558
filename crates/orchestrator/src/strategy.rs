//! Destination delivery strategies.
//!
//! One handler per [`Destination`] variant, selected by an exhaustive match in
//! [`DeliveryStrategies::dispatch`]:
//!
//! - [`DirectApiStrategy`] writes items through a capability-scoped
//!   [`BoardClient`] and tolerates partial batch failure.
//! - [`EphemeralImportStrategy`] asks the [`ImportBroker`] to stage an import
//!   and falls back to a clearly labelled demo link when the broker is down.

use std::sync::Arc;

use pipeline::{
    BoardClientFactory, CredentialProvider, DeliveryError, DeliveryId, DeliveryPayload,
    DeliveryResult, DeliveryTarget, Destination, DirectApiKind, ImportBroker, ImportKind,
    ImportRequest, PromptRecord, TailoredContent, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

/// Lifetime of a fallback demo import link.
pub const FALLBACK_IMPORT_TTL_HOURS: i64 = 24;

/// Everything a strategy needs about the delivery in progress.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryContext<'a> {
    /// Run being delivered.
    pub delivery_id: DeliveryId,
    /// Where to deliver.
    pub target: &'a DeliveryTarget,
    /// Source prompt.
    pub prompt: &'a PromptRecord,
    /// Content produced by the tailor stage.
    pub tailored: &'a TailoredContent,
    /// Optimized, validated payload.
    pub payload: &'a DeliveryPayload,
}

/// How embed URLs for direct-API boards are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedOptions {
    /// Path segment selecting the embed flavour, e.g. `live-embed`.
    pub mode: String,
    /// Value of the `autoplay` query parameter.
    pub autoplay: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            mode: "live-embed".to_string(),
            autoplay: true,
        }
    }
}

/// `https://<host>/app/<embed-mode>/<targetId>?autoplay=<bool>`, with
/// `targetId` percent-encoded as a single path segment.
///
/// # Errors
///
/// [`DeliveryError::Configuration`] if the embed mode cannot form a URL.
pub fn embed_url(
    kind: DirectApiKind,
    target_id: &str,
    options: &EmbedOptions,
) -> Result<String, DeliveryError> {
    let mut url = web_url(kind.web_host(), &["app", options.mode.as_str(), target_id])?;
    url.query_pairs_mut()
        .append_pair("autoplay", if options.autoplay { "true" } else { "false" });
    Ok(url.into())
}

/// Demo link returned when the import broker is unavailable.
pub fn demo_import_url(
    kind: ImportKind,
    delivery_id: DeliveryId,
    target_id: &str,
) -> Result<String, DeliveryError> {
    let delivery_id = delivery_id.to_string();
    let mut url = web_url(kind.web_host(), &["demo", "import", delivery_id.as_str()])?;
    url.query_pairs_mut()
        .append_pair("target", target_id)
        .append_pair("mode", "demo");
    Ok(url.into())
}

fn web_url(host: &str, segments: &[&str]) -> Result<Url, DeliveryError> {
    let invalid = |reason: String| DeliveryError::Configuration {
        message: format!("cannot build a link on '{host}': {reason}"),
    };
    let mut url = Url::parse(&format!("https://{host}/")).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("host cannot carry a path".to_string()))?
        .clear()
        .extend(segments);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Direct API
// ---------------------------------------------------------------------------

/// Delivers to destinations with a write API.
pub struct DirectApiStrategy {
    credentials: Arc<dyn CredentialProvider>,
    clients: Arc<dyn BoardClientFactory>,
    embed: EmbedOptions,
}

impl DirectApiStrategy {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        clients: Arc<dyn BoardClientFactory>,
        embed: EmbedOptions,
    ) -> Self {
        Self {
            credentials,
            clients,
            embed,
        }
    }

    /// Writes the payload's items to the target board.
    ///
    /// Succeeds as long as at least one item was created; failed items become
    /// a warning. A batch in which every item failed is a retryable
    /// [`DeliveryError::Transient`].
    #[instrument(skip_all, fields(delivery_id = %ctx.delivery_id, destination = kind.as_str(), target_id = %ctx.target.target_id))]
    pub async fn deliver(
        &self,
        kind: DirectApiKind,
        ctx: &DeliveryContext<'_>,
    ) -> Result<DeliveryResult, DeliveryError> {
        let target_id = ctx.target.target_id.as_str();
        let token = self.credentials.valid_access_token(kind).await?;
        let client = self.clients.connect(kind, token)?;

        let access = client.validate_board_access(target_id).await?;
        if !access.can_write {
            return Err(DeliveryError::WriteDenied {
                target_id: target_id.to_string(),
                reason: access
                    .reason
                    .unwrap_or_else(|| "the board does not allow edits".to_string()),
            });
        }

        let outcome = client.create_items(target_id, &ctx.payload.items).await?;
        let summary = outcome.summary;
        if summary.total > 0 && summary.successful == 0 {
            let first = outcome
                .failed
                .first()
                .map(|failed| failed.message.as_str())
                .unwrap_or("no items were created");
            return Err(DeliveryError::transient(format!(
                "All {} items failed to deliver: {first}",
                summary.total
            )));
        }

        let mut result = DeliveryResult::processing(ctx.delivery_id, ctx.target, ctx.payload);
        result.record_delivered(summary.successful);
        result.embed_url = Some(embed_url(kind, target_id, &self.embed)?);
        if summary.failed > 0 {
            warn!(failed = summary.failed, total = summary.total, "Partial batch failure");
            result.push_warning(format!(
                "{} of {} items failed to deliver",
                summary.failed, summary.total
            ));
            result.metadata.failed_items = outcome.failed;
        }
        result.succeed();

        info!(delivered = result.delivered_items, total = result.total_items, "Items delivered");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Ephemeral import
// ---------------------------------------------------------------------------

/// Delivers through a short-lived import link.
pub struct EphemeralImportStrategy {
    broker: Arc<dyn ImportBroker>,
}

impl EphemeralImportStrategy {
    pub fn new(broker: Arc<dyn ImportBroker>) -> Self {
        Self { broker }
    }

    /// Stages an import. Broker errors never fail the delivery: they produce a
    /// demo link with a fixed expiry and `metadata.fallback = true`.
    #[instrument(skip_all, fields(delivery_id = %ctx.delivery_id, destination = kind.as_str(), target_id = %ctx.target.target_id))]
    pub async fn deliver(
        &self,
        kind: ImportKind,
        ctx: &DeliveryContext<'_>,
    ) -> Result<DeliveryResult, DeliveryError> {
        let request = ImportRequest {
            destination: kind,
            target_id: ctx.target.target_id.clone(),
            prompt: ctx.prompt.content.clone(),
            tailored_output: ctx.tailored.clone(),
        };

        let mut result = DeliveryResult::processing(ctx.delivery_id, ctx.target, ctx.payload);
        match self.broker.request_import(&request).await {
            Ok(ticket) => {
                info!(broker_delivery_id = %ticket.delivery_id, expires_at = %ticket.expires_at, "Import staged");
                result.import_url = Some(ticket.import_url);
                result.expires_at = Some(ticket.expires_at);
                result.metadata.broker_delivery_id = Some(ticket.delivery_id);
                result.record_delivered(result.total_items);
            }
            Err(error) => {
                warn!(%error, "Import broker failed; returning demo import link");
                result.import_url = Some(demo_import_url(
                    kind,
                    ctx.delivery_id,
                    &ctx.target.target_id,
                )?);
                result.expires_at = Some(Timestamp::now().plus_hours(FALLBACK_IMPORT_TTL_HOURS));
                result.metadata.fallback = true;
                result.push_warning("Import broker unavailable; this is a demo import link");
            }
        }
        result.succeed();
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// One strategy per destination family.
pub struct DeliveryStrategies {
    /// Handles [`Destination::DirectApi`].
    pub direct: DirectApiStrategy,
    /// Handles [`Destination::EphemeralImport`].
    pub import: EphemeralImportStrategy,
}

impl DeliveryStrategies {
    pub async fn dispatch(&self, ctx: &DeliveryContext<'_>) -> Result<DeliveryResult, DeliveryError> {
        match ctx.target.destination {
            Destination::DirectApi(kind) => self.direct.deliver(kind, ctx).await,
            Destination::EphemeralImport(kind) => self.import.deliver(kind, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pipeline::{
        AccessToken, BatchOutcome, BatchSummary, BoardAccess, BoardClient, Connection,
        CreatedItem, DeliveryItem, DeliveryStatus, FailedItem, ImportTicket, ItemId, ItemKind,
        ItemStyle, PayloadId, Position, PromptContext, PromptId, RemoteItemId, Size,
        TailoringMetadata,
    };
    use std::collections::BTreeMap;

    struct StaticCredentials;

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn connection(&self, kind: DirectApiKind) -> Option<Connection> {
            Some(Connection {
                kind,
                account_id: None,
                active: true,
            })
        }

        async fn valid_access_token(&self, _: DirectApiKind) -> Result<AccessToken, DeliveryError> {
            Ok(AccessToken::new("token"))
        }
    }

    /// Board that fails the item ids listed in `fail`.
    struct ScriptedBoard {
        can_write: bool,
        fail: Vec<&'static str>,
    }

    #[async_trait]
    impl BoardClient for ScriptedBoard {
        async fn validate_board_access(&self, _: &str) -> Result<BoardAccess, DeliveryError> {
            Ok(BoardAccess {
                can_read: true,
                can_write: self.can_write,
                reason: (!self.can_write).then(|| "only owners and admins may edit".to_string()),
            })
        }

        async fn create_items(
            &self,
            _: &str,
            items: &[DeliveryItem],
        ) -> Result<BatchOutcome, DeliveryError> {
            let mut outcome = BatchOutcome::default();
            for item in items {
                if self.fail.iter().any(|id| *id == item.id.as_str()) {
                    outcome.failed.push(FailedItem {
                        item_id: item.id.to_string(),
                        message: "server error".into(),
                    });
                } else {
                    outcome.success.push(CreatedItem {
                        item_id: item.id.clone(),
                        remote_id: RemoteItemId::new(format!("r-{}", item.id)).unwrap(),
                    });
                }
            }
            outcome.summary = BatchSummary {
                total: items.len(),
                successful: outcome.success.len(),
                failed: outcome.failed.len(),
            };
            Ok(outcome)
        }
    }

    struct BoardFactory(Mutex<Option<ScriptedBoard>>);

    impl BoardClientFactory for BoardFactory {
        fn connect(
            &self,
            _: DirectApiKind,
            _: AccessToken,
        ) -> Result<Arc<dyn BoardClient>, DeliveryError> {
            let board = self.0.lock().take().expect("connect called once");
            Ok(Arc::new(board))
        }
    }

    struct DownBroker;

    #[async_trait]
    impl ImportBroker for DownBroker {
        async fn request_import(&self, _: &ImportRequest) -> Result<ImportTicket, DeliveryError> {
            Err(DeliveryError::Broker {
                message: "503".into(),
            })
        }
    }

    struct Fixture {
        target: DeliveryTarget,
        prompt: PromptRecord,
        tailored: TailoredContent,
        payload: DeliveryPayload,
    }

    impl Fixture {
        fn new(destination: Destination, items: usize) -> Self {
            let payload = DeliveryPayload {
                id: PayloadId::new_random(),
                destination,
                items: (0..items)
                    .map(|i| DeliveryItem {
                        id: ItemId::for_index(i),
                        kind: ItemKind::Sticky,
                        text: format!("note {i}"),
                        style: ItemStyle::default(),
                        position: Position::default(),
                        size: Size {
                            width: 200.0,
                            height: 200.0,
                        },
                    })
                    .collect(),
                summary: "s".into(),
                source_prompt: "p".into(),
            };
            Self {
                target: DeliveryTarget::new(destination, "b1"),
                prompt: PromptRecord {
                    id: PromptId::new("p1").unwrap(),
                    content: "p".into(),
                    variables: BTreeMap::new(),
                    context: PromptContext::default(),
                    output: None,
                },
                tailored: TailoredContent {
                    content: serde_json::json!({ "items": [] }),
                    metadata: TailoringMetadata::default(),
                },
                payload,
            }
        }

        fn ctx(&self) -> DeliveryContext<'_> {
            DeliveryContext {
                delivery_id: DeliveryId::new_random(),
                target: &self.target,
                prompt: &self.prompt,
                tailored: &self.tailored,
                payload: &self.payload,
            }
        }
    }

    fn direct(board: ScriptedBoard) -> DirectApiStrategy {
        DirectApiStrategy::new(
            Arc::new(StaticCredentials),
            Arc::new(BoardFactory(Mutex::new(Some(board)))),
            EmbedOptions::default(),
        )
    }

    #[test]
    fn embed_url_has_the_expected_shape() {
        assert_eq!(
            embed_url(DirectApiKind::Miro, "b1", &EmbedOptions::default()).unwrap(),
            "https://miro.com/app/live-embed/b1?autoplay=true"
        );
    }

    #[test]
    fn target_ids_are_percent_encoded_in_links() {
        let embed = embed_url(DirectApiKind::Miro, "b/1?x#y", &EmbedOptions::default()).unwrap();
        assert_eq!(embed, "https://miro.com/app/live-embed/b%2F1%3Fx%23y?autoplay=true");

        let id = DeliveryId::new_random();
        let demo = demo_import_url(ImportKind::Figma, id, "a&b c").unwrap();
        assert_eq!(
            demo,
            format!("https://www.figma.com/demo/import/{id}?target=a%26b+c&mode=demo")
        );
    }

    #[tokio::test]
    async fn partial_failure_is_a_warning_on_success() {
        let fixture = Fixture::new(Destination::DirectApi(DirectApiKind::Miro), 5);
        let strategy = direct(ScriptedBoard {
            can_write: true,
            fail: vec!["item-3"],
        });

        let result = strategy
            .deliver(DirectApiKind::Miro, &fixture.ctx())
            .await
            .unwrap();

        assert_eq!(result.status, DeliveryStatus::Success);
        assert_eq!(result.delivered_items, 4);
        assert_eq!(result.total_items, 5);
        assert_eq!(result.warnings.as_ref().map(Vec::len), Some(1));
        assert!(result.warnings.unwrap()[0].starts_with("1 of 5"));
        assert_eq!(result.metadata.failed_items.len(), 1);
    }

    #[tokio::test]
    async fn every_item_failing_is_retryable() {
        let fixture = Fixture::new(Destination::DirectApi(DirectApiKind::Miro), 2);
        let strategy = direct(ScriptedBoard {
            can_write: true,
            fail: vec!["item-1", "item-2"],
        });

        let err = strategy
            .deliver(DirectApiKind::Miro, &fixture.ctx())
            .await
            .unwrap_err();
        assert!(err.retry_policy().is_retryable());
    }

    #[tokio::test]
    async fn read_only_board_is_rejected() {
        let fixture = Fixture::new(Destination::DirectApi(DirectApiKind::Miro), 1);
        let strategy = direct(ScriptedBoard {
            can_write: false,
            fail: vec![],
        });

        let err = strategy
            .deliver(DirectApiKind::Miro, &fixture.ctx())
            .await
            .unwrap_err();
        match err {
            DeliveryError::WriteDenied { target_id, reason } => {
                assert_eq!(target_id, "b1");
                assert!(reason.contains("owners and admins"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn broker_failure_yields_demo_link_valid_for_a_day() {
        let fixture = Fixture::new(Destination::EphemeralImport(ImportKind::Figma), 3);
        let strategy = EphemeralImportStrategy::new(Arc::new(DownBroker));
        let before = Timestamp::now();

        let result = strategy
            .deliver(ImportKind::Figma, &fixture.ctx())
            .await
            .unwrap();

        assert_eq!(result.status, DeliveryStatus::Success);
        assert!(result.metadata.fallback);
        assert!(result.import_url.as_deref().unwrap().contains("/demo/import/"));
        let expires = result.expires_at.unwrap().as_datetime();
        let ttl_secs = (expires - before.as_datetime()).num_seconds();
        assert!((86_400..86_405).contains(&ttl_secs), "ttl was {ttl_secs}s");
        assert!(result.delivered_items <= result.total_items);
    }
}
