//! Delivery result persistence adapter.
//!
//! Implements [`pipeline::ResultSink`] as an upsert into a `deliveries` table
//! exposed over PostgREST. Rows are keyed by delivery id, so persisting the
//! same delivery twice updates the existing row.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The orchestrator treats persistence as best-effort: it
//! logs and discards every error returned from here. When no authenticated
//! actor is configured the sink skips the write entirely.

pub mod record;
pub mod sink;

pub use record::DeliveryRecord;
pub use sink::{HttpResultSink, ResultsConfig};
