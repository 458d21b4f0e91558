//! Delivery payload and item value types.
//!
//! A [`DeliveryPayload`] is the destination-agnostic, normalized form of
//! tailored content. It is produced once per delivery and may be replaced by an
//! optimized variant that keeps the same [`PayloadId`].

use serde::{Deserialize, Serialize};

use crate::{Destination, ItemId, PayloadId};

/// Abstract kind of a visual object. Each destination maps it onto its own
/// item-creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A sticky note.
    Sticky,
    /// A free-standing text block.
    Text,
    /// A geometric shape with text inside.
    Shape,
}

impl ItemKind {
    /// Returns the wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticky => "sticky",
            Self::Text => "text",
            Self::Shape => "shape",
        }
    }

    /// Parses the loose names produced by content generators.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sticky" | "sticky_note" | "note" => Some(Self::Sticky),
            "text" | "heading" | "label" => Some(Self::Text),
            "shape" | "rectangle" | "frame" => Some(Self::Shape),
            _ => None,
        }
    }
}

/// Visual style of an item. Absent fields fall back to destination defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStyle {
    /// Background colour (named colour or `#rrggbb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    /// Text colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u16>,
}

/// Centre point of an item on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset from the canvas origin.
    pub x: f64,
    /// Vertical offset from the canvas origin.
    pub y: f64,
}

/// Width and height of an item on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Must be finite and positive.
    pub width: f64,
    /// Must be finite and positive.
    pub height: f64,
}

/// Atomic visual object delivered to a destination. Immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    /// Unique within the payload.
    pub id: ItemId,
    /// Which destination object to create.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Visible text; never blank after optimization.
    pub text: String,
    /// Optional visual overrides.
    #[serde(default)]
    pub style: ItemStyle,
    /// Canvas placement.
    pub position: Position,
    /// Canvas dimensions.
    pub size: Size,
}

/// Normalized item list plus summary for one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    /// Kept across optimization.
    pub id: PayloadId,
    /// Destination the items were shaped for.
    pub destination: Destination,
    /// Items in delivery order.
    pub items: Vec<DeliveryItem>,
    /// One-line description of the payload.
    pub summary: String,
    /// Prompt text the payload was generated from.
    pub source_prompt: String,
}

/// Outcome of structural payload validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every violation found; empty when the payload is valid.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` when no violations were found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kind_accepts_generator_aliases() {
        assert_eq!(ItemKind::parse("sticky_note"), Some(ItemKind::Sticky));
        assert_eq!(ItemKind::parse("Heading"), Some(ItemKind::Text));
        assert_eq!(ItemKind::parse("frame"), Some(ItemKind::Shape));
        assert_eq!(ItemKind::parse("connector"), None);
    }

    #[test]
    fn item_serializes_kind_as_type() {
        let item = DeliveryItem {
            id: ItemId::new("item-1").unwrap(),
            kind: ItemKind::Sticky,
            text: "hello".into(),
            style: ItemStyle::default(),
            position: Position { x: 0.0, y: 0.0 },
            size: Size {
                width: 200.0,
                height: 200.0,
            },
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "sticky");
        assert!(json["style"].get("fillColor").is_none());
    }
}
