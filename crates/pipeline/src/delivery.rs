//! Delivery outcome and progress types.

use serde::{Deserialize, Serialize};

use crate::{DeliveryId, DeliveryPayload, DeliveryTarget, Destination, PayloadId, Timestamp};

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// The six pipeline stages, plus the terminal `Error` marker used only in
/// progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    /// Prompt lookup and target validation.
    Initialize,
    /// Destination-specific content tailoring.
    Tailor,
    /// Normalization into a delivery payload.
    Generate,
    /// Destination optimizer and structural validation.
    Optimize,
    /// Writing items or staging the import.
    Deliver,
    /// Persisting the result.
    Complete,
    /// The delivery failed; always the last event.
    Error,
}

impl DeliveryStage {
    /// Progress milestone reported when the stage starts.
    ///
    /// Milestones are UI hints, not computed from live item counts.
    pub fn milestone(self) -> u8 {
        match self {
            Self::Initialize => 5,
            Self::Tailor => 15,
            Self::Generate => 35,
            Self::Optimize => 50,
            Self::Deliver => 70,
            Self::Complete => 95,
            Self::Error => 0,
        }
    }

    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Tailor => "tailor",
            Self::Generate => "generate",
            Self::Optimize => "optimize",
            Self::Deliver => "deliver",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral progress event. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProgress {
    /// Stage the event belongs to.
    pub stage: DeliveryStage,
    /// 0–100; non-decreasing on the happy path.
    pub progress: u8,
    /// Human-readable description of the step.
    pub message: String,
    /// Stage-specific structured data, e.g. `deliveryId` or `totalItems`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DeliveryProgress {
    /// Creates a progress event at `stage`'s milestone.
    pub fn at(stage: DeliveryStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: stage.milestone(),
            message: message.into(),
            details: None,
        }
    }

    /// Overrides the progress percentage (clamped to 100).
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    /// Attaches structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`DeliveryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The result is still being assembled.
    Processing,
    /// The destination received the delivery, possibly with warnings.
    Success,
    /// The delivery failed.
    Error,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// An item the destination refused, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    /// Payload id of the refused item.
    pub item_id: String,
    /// Normalized error reported by the destination.
    pub message: String,
}

/// Auxiliary facts about how a result was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetadata {
    /// A deterministic fallback replaced an unavailable collaborator during
    /// delivery (e.g. a demo import link).
    #[serde(default)]
    pub fallback: bool,
    /// Tailored content came from the fallback template instead of the AI
    /// generator.
    #[serde(default)]
    pub content_fallback: bool,
    /// Model that tailored the content, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Broker-side id of a staged import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_delivery_id: Option<String>,
    /// Items the destination refused.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<FailedItem>,
}

/// Outcome of one delivery.
///
/// Created at the deliver stage, mutated in place until finalized, then
/// persisted read-only. `delivered_items <= total_items` and `total_items`
/// equals the payload's item count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// Id of the delivery run that produced this result.
    pub id: DeliveryId,
    /// Lifecycle status.
    pub status: DeliveryStatus,
    /// Where the payload was sent.
    pub destination: Destination,
    /// Board id or design file key.
    pub target_id: String,
    /// Payload the result was built from.
    pub payload_id: PayloadId,
    /// Items the destination accepted.
    pub delivered_items: usize,
    /// Items in the delivered payload.
    pub total_items: usize,
    /// Embeddable board link for direct-API destinations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// Import link for ephemeral-import destinations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_url: Option<String>,
    /// When `import_url` stops working.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Degradations the caller should know about; `None` when there were none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    /// Failure message when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How the result was produced.
    pub metadata: DeliveryMetadata,
    /// When the result was first created.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl DeliveryResult {
    /// Starts a `processing` result for `payload` bound for `target`.
    pub fn processing(id: DeliveryId, target: &DeliveryTarget, payload: &DeliveryPayload) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            status: DeliveryStatus::Processing,
            destination: target.destination,
            target_id: target.target_id.clone(),
            payload_id: payload.id,
            delivered_items: 0,
            total_items: payload.items.len(),
            embed_url: None,
            import_url: None,
            expires_at: None,
            warnings: None,
            error: None,
            metadata: DeliveryMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records how many items reached the destination, clamped to the total.
    pub fn record_delivered(&mut self, delivered: usize) {
        self.delivered_items = delivered.min(self.total_items);
        self.touch();
    }

    /// Appends a warning, creating the list on first use.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.get_or_insert_with(Vec::new).push(warning.into());
        self.touch();
    }

    /// Marks the result as successfully delivered.
    pub fn succeed(&mut self) {
        self.status = DeliveryStatus::Success;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DirectApiKind, ItemId, ItemKind, ItemStyle, Position, Size};

    fn payload(items: usize) -> DeliveryPayload {
        DeliveryPayload {
            id: PayloadId::new_random(),
            destination: Destination::DirectApi(DirectApiKind::Miro),
            items: (0..items)
                .map(|i| crate::DeliveryItem {
                    id: ItemId::new(format!("item-{i}")).unwrap(),
                    kind: ItemKind::Sticky,
                    text: "x".into(),
                    style: ItemStyle::default(),
                    position: Position::default(),
                    size: Size {
                        width: 200.0,
                        height: 200.0,
                    },
                })
                .collect(),
            summary: String::new(),
            source_prompt: String::new(),
        }
    }

    #[test]
    fn delivered_count_never_exceeds_total() {
        let target = DeliveryTarget::new(Destination::DirectApi(DirectApiKind::Miro), "b1");
        let mut result = DeliveryResult::processing(DeliveryId::new_random(), &target, &payload(3));
        assert_eq!(result.total_items, 3);
        result.record_delivered(7);
        assert_eq!(result.delivered_items, 3);
    }

    #[test]
    fn warnings_stay_absent_until_pushed() {
        let target = DeliveryTarget::new(Destination::DirectApi(DirectApiKind::Miro), "b1");
        let mut result = DeliveryResult::processing(DeliveryId::new_random(), &target, &payload(1));
        assert!(result.warnings.is_none());
        result.push_warning("1 item failed");
        assert_eq!(result.warnings.as_deref(), Some(&["1 item failed".to_string()][..]));
    }

    #[test]
    fn error_stage_reports_zero_progress() {
        assert_eq!(DeliveryProgress::at(DeliveryStage::Error, "x").progress, 0);
        assert_eq!(
            DeliveryProgress::at(DeliveryStage::Complete, "x")
                .with_progress(140)
                .progress,
            100
        );
    }
}
