//! Shared value types for the delivery domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a destination is one of a closed set, a
//! target must name both a destination and a target id) and participate in
//! routing decisions.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::DeliveryError;

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// Destinations reachable through a direct-write REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectApiKind {
    /// Miro whiteboards.
    Miro,
}

impl DirectApiKind {
    /// Returns the wire name of this destination (e.g. `"miro"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Miro => "miro",
        }
    }

    /// Returns the public web host boards of this destination are served from.
    pub fn web_host(self) -> &'static str {
        match self {
            Self::Miro => "miro.com",
        }
    }
}

/// Destinations that lack a direct write API and are fed through a
/// broker-staged, time-limited import link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// Figma design files.
    Figma,
}

impl ImportKind {
    /// Returns the wire name of this destination (e.g. `"figma"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Figma => "figma",
        }
    }

    /// Returns the public web host import links for this destination point at.
    pub fn web_host(self) -> &'static str {
        match self {
            Self::Figma => "www.figma.com",
        }
    }
}

/// The external collaboration surface content is delivered to.
///
/// A closed sum type: every `match` over it is exhaustive, so adding a
/// destination is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Destination {
    /// Written item by item through the destination's REST API.
    DirectApi(DirectApiKind),
    /// Staged by the import broker and opened by the user via a link.
    EphemeralImport(ImportKind),
}

impl Destination {
    /// Parses a destination from its wire name. Matching is case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "miro" => Some(Self::DirectApi(DirectApiKind::Miro)),
            "figma" => Some(Self::EphemeralImport(ImportKind::Figma)),
            _ => None,
        }
    }

    /// Returns the wire name of this destination.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectApi(kind) => kind.as_str(),
            Self::EphemeralImport(kind) => kind.as_str(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Destination {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown destination '{value}'"))
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------

/// A `(destination, target id)` pair. Immutable once a delivery starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTarget {
    /// Where content is delivered.
    pub destination: Destination,
    /// Destination-side identifier (board id, file key).
    pub target_id: String,
}

impl DeliveryTarget {
    /// Creates a target from an already-parsed destination.
    pub fn new(destination: Destination, target_id: impl Into<String>) -> Self {
        Self {
            destination,
            target_id: target_id.into(),
        }
    }

    /// Builds a target from raw user input, collecting every violation into a
    /// single [`DeliveryError::InvalidTarget`] rather than failing on the first.
    pub fn from_parts(destination: &str, target_id: &str) -> Result<Self, DeliveryError> {
        let mut violations = Vec::new();
        let parsed = if destination.trim().is_empty() {
            violations.push("Destination is required".to_string());
            None
        } else {
            let parsed = Destination::parse(destination);
            if parsed.is_none() {
                violations.push(format!("Unsupported destination '{destination}'"));
            }
            parsed
        };
        if target_id.trim().is_empty() {
            violations.push("Target ID is required".to_string());
        }

        match parsed {
            Some(destination) if violations.is_empty() => Ok(Self::new(destination, target_id)),
            _ => Err(DeliveryError::InvalidTarget { violations }),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from seconds since the Unix epoch.
    ///
    /// Returns `None` for values chrono cannot represent.
    pub fn from_epoch_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns this timestamp shifted forward by `hours`.
    pub fn plus_hours(self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_round_trips_through_its_wire_name() {
        let miro = Destination::parse("Miro").unwrap();
        assert_eq!(miro, Destination::DirectApi(DirectApiKind::Miro));
        assert_eq!(serde_json::to_string(&miro).unwrap(), "\"miro\"");

        let figma: Destination = serde_json::from_str("\"figma\"").unwrap();
        assert_eq!(figma, Destination::EphemeralImport(ImportKind::Figma));
        assert!(serde_json::from_str::<Destination>("\"canva\"").is_err());
    }

    #[test]
    fn from_parts_collects_every_violation() {
        let err = DeliveryTarget::from_parts("canva", "  ").unwrap_err();
        match err {
            DeliveryError::InvalidTarget { violations } => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("canva"));
                assert_eq!(violations[1], "Target ID is required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_parts_accepts_a_complete_target() {
        let target = DeliveryTarget::from_parts("miro", "b1").unwrap();
        assert_eq!(target.target_id, "b1");
        assert_eq!(target.destination.as_str(), "miro");
    }

    #[test]
    fn plus_hours_moves_forward() {
        let start = Timestamp::from_epoch_secs(0).unwrap();
        assert_eq!(start.plus_hours(24).as_datetime().timestamp(), 86_400);
    }
}
