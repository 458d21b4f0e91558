//! Default payload normalizer: tailored content → [`DeliveryPayload`], plus
//! the destination optimizer and the structural validator.

use std::collections::HashSet;

use async_trait::async_trait;
use pipeline::{
    DeliveryError, DeliveryItem, DeliveryPayload, DeliveryTarget, Destination, ImportKind, ItemId,
    ItemKind, ItemStyle, PayloadId, PayloadNormalizer, Position, Size, TailoredContent,
    ValidationReport,
};
use serde_json::Value;
use tracing::warn;

/// Items per row when an entry carries no position of its own.
const GRID_COLUMNS: usize = 4;
/// Distance between grid cell centres.
const GRID_SPACING: f64 = 240.0;

/// Hard cap enforced by validation.
pub const MAX_ITEMS: usize = 200;
/// Cap applied by the board optimizer.
const BOARD_MAX_ITEMS: usize = 100;
/// Longest text a board item accepts.
const BOARD_MAX_TEXT: usize = 6000;
const DESIGN_MAX_TEXT: usize = 5000;

const MIN_FONT_SIZE: u16 = 8;
const MAX_FONT_SIZE: u16 = 288;

/// Stateless [`PayloadNormalizer`] used when no remote normalizer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPayloadNormalizer;

#[async_trait]
impl PayloadNormalizer for DefaultPayloadNormalizer {
    async fn generate_delivery_payload(
        &self,
        tailored: &TailoredContent,
        target: &DeliveryTarget,
        prompt_content: &str,
    ) -> Result<DeliveryPayload, DeliveryError> {
        let entries = tailored.entries();
        if entries.is_empty() {
            return Err(DeliveryError::ValidationFailed {
                violations: vec!["Tailored content contains no items".to_string()],
            });
        }

        let items = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| item_from_entry(index, entry))
            .collect::<Vec<_>>();
        let summary = tailored
            .content
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} items for {}", items.len(), target.destination));

        Ok(DeliveryPayload {
            id: PayloadId::new_random(),
            destination: target.destination,
            items,
            summary,
            source_prompt: prompt_content.to_string(),
        })
    }

    fn optimize_payload_for_destination(&self, mut payload: DeliveryPayload) -> DeliveryPayload {
        match payload.destination {
            Destination::DirectApi(_) => {
                let before = payload.items.len();
                payload.items.retain(|item| !item.text.trim().is_empty());
                let blank = before - payload.items.len();
                payload.items.truncate(BOARD_MAX_ITEMS);
                let over_cap = before - blank - payload.items.len();
                if blank + over_cap > 0 {
                    warn!(
                        payload_id = %payload.id,
                        blank,
                        over_cap,
                        kept = payload.items.len(),
                        "Board optimizer dropped items"
                    );
                }
                for item in &mut payload.items {
                    item.text = truncate_chars(item.text.trim(), BOARD_MAX_TEXT);
                    if item.kind == ItemKind::Sticky && item.style.fill_color.is_none() {
                        item.style.fill_color = Some("light_yellow".to_string());
                    }
                }
            }
            Destination::EphemeralImport(ImportKind::Figma) => {
                for item in &mut payload.items {
                    item.text = truncate_chars(item.text.trim(), DESIGN_MAX_TEXT);
                }
            }
        }
        payload
    }

    fn validate_delivery_payload(&self, payload: &DeliveryPayload) -> ValidationReport {
        let mut errors = Vec::new();
        if payload.items.is_empty() {
            errors.push("Payload contains no items".to_string());
        }
        if payload.items.len() > MAX_ITEMS {
            errors.push(format!(
                "Payload has {} items, the maximum is {MAX_ITEMS}",
                payload.items.len()
            ));
        }

        let mut seen = HashSet::new();
        for item in &payload.items {
            let id = item.id.as_str();
            if !seen.insert(id) {
                errors.push(format!("Duplicate item id '{id}'"));
            }
            if item.text.trim().is_empty() {
                errors.push(format!("Item '{id}' has no text"));
            }
            let Size { width, height } = item.size;
            if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
                errors.push(format!("Item '{id}' has invalid size {width}x{height}"));
            }
            if !(item.position.x.is_finite() && item.position.y.is_finite()) {
                errors.push(format!("Item '{id}' has invalid position"));
            }
            if let Some(size) = item.style.font_size {
                if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size) {
                    errors.push(format!("Item '{id}' font size {size} is out of range"));
                }
            }
        }

        ValidationReport { errors }
    }
}

fn item_from_entry(index: usize, entry: &Value) -> DeliveryItem {
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .and_then(ItemKind::parse)
        .unwrap_or(ItemKind::Sticky);
    let text = ["text", "content", "title"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let style = entry
        .get("style")
        .and_then(|style| serde_json::from_value::<ItemStyle>(style.clone()).ok())
        .unwrap_or_default();
    let position = entry
        .get("position")
        .and_then(|p| serde_json::from_value::<Position>(p.clone()).ok())
        .unwrap_or_else(|| grid_position(index));
    let size = entry
        .get("size")
        .and_then(|s| serde_json::from_value::<Size>(s.clone()).ok())
        .unwrap_or_else(|| default_size(kind));

    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .and_then(ItemId::new)
        .unwrap_or_else(|| ItemId::for_index(index));

    DeliveryItem {
        id,
        kind,
        text,
        style,
        position,
        size,
    }
}

fn grid_position(index: usize) -> Position {
    let column = (index % GRID_COLUMNS) as f64;
    let row = (index / GRID_COLUMNS) as f64;
    Position {
        x: column * GRID_SPACING,
        y: row * GRID_SPACING,
    }
}

fn default_size(kind: ItemKind) -> Size {
    let (width, height) = match kind {
        ItemKind::Sticky => (200.0, 200.0),
        ItemKind::Text => (400.0, 60.0),
        ItemKind::Shape => (300.0, 150.0),
    };
    Size { width, height }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
