//! Newtype identifiers for deliveries, payloads, prompts and items.
//!
//! Deliveries and payloads are minted here as UUIDs; prompt and item ids come
//! from outside as non-empty strings. Distinct types keep a [`PromptId`] from
//! being passed where an [`ItemId`] is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for UUID-backed newtypes (internally generated).
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates the identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies one delivery run.
    ///
    /// Generated fresh by the orchestrator for every `execute_delivery` call and
    /// used as the key of the active-deliveries registry, the result record and
    /// every tracing span emitted on the delivery's behalf.
    DeliveryId
}

uuid_id! {
    /// Identifies a normalized [`crate::DeliveryPayload`].
    ///
    /// An optimized payload keeps the id of the payload it was derived from.
    PayloadId
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a prompt in the prompt store.
    PromptId
}

string_id! {
    /// Identifies one item inside a delivery payload (e.g. `"item-3"`).
    ItemId
}

impl ItemId {
    /// Positional id (`"item-1"`, `"item-2"`, …) for the entry at `index`.
    pub fn for_index(index: usize) -> Self {
        Self(format!("item-{}", index + 1))
    }
}

string_id! {
    /// Identifier the destination assigned to an item it created.
    RemoteItemId
}
