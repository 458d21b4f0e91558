//! Core delivery domain.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, error type and port trait used by the delivery pipeline. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`DeliveryId`, `PromptId`, etc.) |
//! | [`types`] | Destinations, targets, timestamps |
//! | [`payload`] | Delivery items and payloads |
//! | [`delivery`] | Results, progress events, stages |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`ports`] | Collaborator traits |

pub mod delivery;
pub mod errors;
pub mod identifiers;
pub mod payload;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use delivery::{
    DeliveryMetadata, DeliveryProgress, DeliveryResult, DeliveryStage, DeliveryStatus, FailedItem,
};
pub use errors::{ApiError, DeliveryError, RetryPolicy};
pub use identifiers::{DeliveryId, ItemId, PayloadId, PromptId, RemoteItemId};
pub use payload::{
    DeliveryItem, DeliveryPayload, ItemKind, ItemStyle, Position, Size, ValidationReport,
};
pub use ports::{
    AccessToken, BatchOutcome, BatchSummary, BoardAccess, BoardClient, BoardClientFactory,
    Connection, ContentGenerator, CreatedItem, CredentialProvider, GenerationRequest,
    ImportBroker, ImportRequest, ImportTicket, PayloadNormalizer, PromptContext, PromptRecord,
    PromptStore, ResultSink, TailoredContent, TailoringMetadata,
};
pub use types::{DeliveryTarget, Destination, DirectApiKind, ImportKind, Timestamp};
