//! AI content generator infrastructure adapter.
//!
//! Implements [`pipeline::ContentGenerator`] against the prompt product's
//! content-generation endpoint. The endpoint answers either
//! `{success: true, content, metadata{generatedAt, model, itemCount}}` or
//! `{success: false, error}`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and status classification live here. The orchestrator sees only
//! [`pipeline::ContentGenerator`] and falls back to its own templates on any
//! error this crate returns.

pub mod error;
pub mod generator;

pub use error::GeneratorError;
pub use generator::{parse_generation_response, GeneratorConfig, HttpContentGenerator};
