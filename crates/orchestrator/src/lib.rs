//! Delivery pipeline orchestration.
//!
//! This crate sequences the six delivery stages, applies the shared retry
//! policy, owns per-delivery cancellation, tailors content (with deterministic
//! fallback), normalizes payloads and dispatches to the destination strategy.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Everything here talks to collaborators through the
//! port traits in [`pipeline`]; concrete HTTP adapters live in the
//! infrastructure crates and are injected by the composition root.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`executor`] | `DeliveryOrchestrator` and its stage sequence |
//! | [`retry`] | Exponential back-off helper |
//! | [`registry`] | Active-delivery registry and cancellation tokens |
//! | [`tailoring`] | AI tailoring with fallback templates |
//! | [`payload`] | Default payload normalizer, optimizer, validator |
//! | [`strategy`] | Direct-API and ephemeral-import strategies |
//! | [`options`] | Per-delivery options |

pub mod executor;
pub mod options;
pub mod payload;
pub mod registry;
pub mod retry;
pub mod strategy;
pub mod tailoring;

pub use executor::{Collaborators, DeliveryOrchestrator};
pub use options::DeliveryOptions;
pub use payload::DefaultPayloadNormalizer;
pub use registry::{DeliveryRegistry, RegistrationGuard};
pub use retry::{backoff_delay, retry_with_backoff};
pub use strategy::{
    demo_import_url, embed_url, DeliveryContext, DeliveryStrategies, DirectApiStrategy,
    EmbedOptions, EphemeralImportStrategy,
};
pub use tailoring::{fallback_content, Tailor};
