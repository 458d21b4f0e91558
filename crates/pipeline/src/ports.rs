//! Port traits for every collaborator the delivery pipeline consumes or
//! produces to, plus the request/response types that cross those seams.
//!
//! Infrastructure crates implement these traits; the orchestrator depends only
//! on them, so every collaborator can be replaced by an in-memory fake in tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    DeliveryError, DeliveryItem, DeliveryPayload, DeliveryResult, DeliveryTarget, Destination,
    DirectApiKind, FailedItem, ImportKind, ItemId, PromptId, RemoteItemId, Timestamp,
    ValidationReport,
};

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Framework/stage/tool names a prompt was authored under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Methodology, e.g. `Design Thinking`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Stage within the framework, e.g. `Ideate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Exercise or tool, e.g. `Crazy 8s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// A prompt as returned by the prompt store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Store key.
    pub id: PromptId,
    /// Prompt text as authored.
    pub content: String,
    /// Template variables and their values.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Where the prompt sits in its framework.
    #[serde(default)]
    pub context: PromptContext,
    /// Structured output produced earlier for this prompt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TailoredContent>,
}

/// Read access to stored prompts.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Fetches a prompt.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::NotFound`] if no prompt has this id.
    async fn get(&self, id: &PromptId) -> Result<PromptRecord, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Tailored content
// ---------------------------------------------------------------------------

/// Provenance of tailored content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailoringMetadata {
    /// When the content was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<Timestamp>,
    /// Model that produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Number of entries in the content.
    #[serde(default)]
    pub item_count: usize,
    /// Content came from the deterministic fallback template.
    #[serde(default)]
    pub fallback: bool,
}

/// Destination-appropriate structured content.
///
/// Board destinations carry an `items` array; design destinations carry a
/// `uiBlocks` array. Everything else in `content` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailoredContent {
    /// Destination-shaped JSON.
    pub content: serde_json::Value,
    /// Where the content came from.
    #[serde(default)]
    pub metadata: TailoringMetadata,
}

impl TailoredContent {
    /// Returns the item-like entries (`items` or `uiBlocks`), empty if neither
    /// is present.
    pub fn entries(&self) -> &[serde_json::Value] {
        ["items", "uiBlocks"]
            .iter()
            .find_map(|key| self.content.get(*key).and_then(|v| v.as_array()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns `true` if the content holds at least one entry.
    pub fn has_entries(&self) -> bool {
        !self.entries().is_empty()
    }
}

/// Request sent to the AI content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prompt text to tailor.
    pub prompt: String,
    /// Destination the content is shaped for.
    pub destination: Destination,
    /// Framework context of the prompt.
    pub context: PromptContext,
    /// Template variables of the prompt.
    pub variables: BTreeMap<String, String>,
}

/// Remote AI content generation.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Tailors prompt output for a destination.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Generation`] for explicit unsuccess or malformed
    /// responses; transport errors otherwise.
    async fn generate(&self, request: &GenerationRequest) -> Result<TailoredContent, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Payload normalization
// ---------------------------------------------------------------------------

/// Turns tailored content into a [`DeliveryPayload`], optimizes and validates it.
#[async_trait]
pub trait PayloadNormalizer: Send + Sync {
    async fn generate_delivery_payload(
        &self,
        tailored: &TailoredContent,
        target: &DeliveryTarget,
        prompt_content: &str,
    ) -> Result<DeliveryPayload, DeliveryError>;

    /// Returns a destination-optimized payload with the same id.
    fn optimize_payload_for_destination(&self, payload: DeliveryPayload) -> DeliveryPayload;

    fn validate_delivery_payload(&self, payload: &DeliveryPayload) -> ValidationReport;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A linked destination account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Destination the account belongs to.
    pub kind: DirectApiKind,
    /// Account id at the destination, when known.
    pub account_id: Option<String>,
    /// Inactive connections cannot be delivered to.
    pub active: bool,
}

/// OAuth access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for use in an `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Source of destination credentials for the current actor.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the actor's connection to `kind`, if one exists.
    async fn connection(&self, kind: DirectApiKind) -> Option<Connection>;

    /// Returns a token that is valid now, refreshing it if necessary.
    async fn valid_access_token(&self, kind: DirectApiKind) -> Result<AccessToken, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Direct-write boards
// ---------------------------------------------------------------------------

/// Read/write capability of the current actor on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardAccess {
    /// The board can be fetched with the current credentials.
    pub can_read: bool,
    /// Items may be created on the board.
    pub can_write: bool,
    /// Why write access is unavailable, when it is.
    pub reason: Option<String>,
}

/// An item the destination created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    /// Payload id of the item.
    pub item_id: ItemId,
    /// Id the destination assigned.
    pub remote_id: RemoteItemId,
}

/// Counts for a batch create; `successful + failed == total` unless the batch aborted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items submitted.
    pub total: usize,
    /// Items created.
    pub successful: usize,
    /// Items refused.
    pub failed: usize,
}

/// Result of a sequential batch create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Created items, in submission order.
    pub success: Vec<CreatedItem>,
    /// Refused items, in submission order.
    pub failed: Vec<FailedItem>,
    /// Counts over both lists.
    pub summary: BatchSummary,
}

/// Capability-scoped client for one direct-write destination.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Checks that the board is readable and derives write capability.
    async fn validate_board_access(&self, target_id: &str) -> Result<BoardAccess, DeliveryError>;

    /// Creates `items` in order.
    ///
    /// Per-item failures are collected into [`BatchOutcome::failed`]; an
    /// authentication failure aborts the remaining items and is returned.
    async fn create_items(
        &self,
        target_id: &str,
        items: &[DeliveryItem],
    ) -> Result<BatchOutcome, DeliveryError>;
}

/// Builds a [`BoardClient`] bound to a live access token.
pub trait BoardClientFactory: Send + Sync {
    fn connect(
        &self,
        kind: DirectApiKind,
        token: AccessToken,
    ) -> Result<Arc<dyn BoardClient>, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Ephemeral imports
// ---------------------------------------------------------------------------

/// What the broker needs to stage an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// Design tool receiving the import.
    pub destination: ImportKind,
    /// Design file key.
    pub target_id: String,
    /// Prompt text.
    pub prompt: String,
    /// Content to import.
    pub tailored_output: TailoredContent,
}

/// A staged import the user opens via `import_url` before `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTicket {
    /// Link that opens the import in the design tool.
    pub import_url: String,
    /// When the link stops working.
    pub expires_at: Timestamp,
    /// Broker-side id of the staged import.
    pub delivery_id: String,
}

/// Broker that stages imports for destinations without a write API.
#[async_trait]
pub trait ImportBroker: Send + Sync {
    async fn request_import(&self, request: &ImportRequest) -> Result<ImportTicket, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Result persistence
// ---------------------------------------------------------------------------

/// Best-effort sink for finalized results.
///
/// Implementations skip silently when no authenticated actor is available.
/// The orchestrator logs and swallows every error this returns.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, result: &DeliveryResult) -> Result<(), DeliveryError>;
}
