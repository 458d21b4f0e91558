//! Miro infrastructure adapter.
//!
//! Implements [`pipeline::BoardClient`] and [`pipeline::BoardClientFactory`]
//! against the Miro REST v2 API.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain delivery rules. All Miro
//! API details (item shapes, rate-limit headers, error bodies, board policy
//! fields) are handled here; the [`pipeline`] crate never sees them.
//!
//! ## Behaviour
//!
//! - Items are created **sequentially** with a fixed pause between calls.
//! - Before each request the client waits for the rate-limit window to reset
//!   when headroom drops to [`RATE_LIMIT_FLOOR`] or below.
//! - Every non-2xx response is normalized into [`pipeline::ApiError`].
//! - A 401/403 during a batch aborts the remaining items.

pub mod client;
pub mod rate_limit;
pub mod transport;

pub use client::{normalize_error, MiroClient, MiroClientFactory, MiroConfig};
pub use rate_limit::{RateLimitState, RATE_LIMIT_FLOOR};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
