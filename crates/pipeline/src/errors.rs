//! Error taxonomy and retry-policy types for the delivery pipeline.
//!
//! [`DeliveryError`] is the closed set of failures a delivery can end in.
//! Retryability is decided where the error is constructed and exposed through
//! [`DeliveryError::retry_policy`]; the retry helper never inspects message text.
//!
//! [`ApiError`] is the single normalized shape every non-2xx destination
//! response is converted into, so classification has one surface to look at.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DeliveryId;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: transport failures, timeouts, rate-limit responses,
///   server errors.
/// - `NonRetryable` errors: missing prompts, invalid targets, payload
///   validation failures, authentication/authorization failures, cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` or `x-ratelimit-reset` response headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Normalized destination API error
// ---------------------------------------------------------------------------

/// A non-2xx response from a destination API, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable code from the response body, or derived from the status.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// What the client was doing (e.g. `"create sticky_note on board b1"`).
    pub context: String,
    /// Delay suggested by the server before retrying, if any.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Returns `true` for 401/403-class responses.
    pub fn is_auth(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    /// Retry classification derived from the status code.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.status {
            408 | 429 | 500..=599 => RetryPolicy::Retryable {
                after: self.retry_after,
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {}) while attempting to {}",
            self.message, self.status, self.code, self.context
        )
    }
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Every way a delivery, or one of its collaborators, can fail.
///
/// Partial batch failures are not errors: they are recorded as warnings on an
/// otherwise successful [`crate::DeliveryResult`].
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// A referenced entity (prompt, board) does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of entity, e.g. `"Prompt"`.
        what: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// The delivery target is unusable. Lists every violation.
    #[error("Invalid delivery target: {}", violations.join(", "))]
    InvalidTarget {
        /// Each problem found with the target.
        violations: Vec<String>,
    },

    /// The normalized payload failed structural validation.
    #[error("Payload validation failed: {}", violations.join(", "))]
    ValidationFailed {
        /// Each validation error.
        violations: Vec<String>,
    },

    /// Credentials were rejected. Aborts any remaining batch work.
    #[error("Authentication failed: {message}")]
    AuthFailure {
        /// Description of the rejected credential or permission.
        message: String,
    },

    /// The actor may read the target but not write to it.
    #[error("Write access denied for target {target_id}: {reason}")]
    WriteDenied {
        /// Target that was checked.
        target_id: String,
        /// Why write access is unavailable.
        reason: String,
    },

    /// A destination API answered with a non-2xx status.
    #[error("{0}")]
    Api(ApiError),

    /// A failure expected to clear on its own (network, timeout, overload).
    #[error("Transient failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
        /// Server-suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The AI content generator failed or answered with an unusable response.
    #[error("Content generation failed: {message}")]
    Generation {
        /// Description of the failure.
        message: String,
    },

    /// The ephemeral import broker failed.
    #[error("Import broker unavailable: {message}")]
    Broker {
        /// Description of the failure.
        message: String,
    },

    /// Persisting the final result failed. Never surfaced by the orchestrator.
    #[error("Failed to persist delivery result: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },

    /// The delivery was cancelled by its owner.
    #[error("Delivery {delivery_id} was cancelled")]
    Cancelled {
        /// The cancelled delivery.
        delivery_id: DeliveryId,
    },

    /// A retryable operation kept failing until attempts ran out.
    #[error("Operation failed after {attempts} attempts: {last_message}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the final failure.
        last_message: String,
    },

    /// Invalid runtime configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl DeliveryError {
    /// Shorthand for a [`DeliveryError::Transient`] without a server hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Returns `true` if this error means credentials were rejected.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthFailure { .. } => true,
            Self::Api(api) => api.is_auth(),
            _ => false,
        }
    }

    /// Whether the failed operation may be attempted again.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transient { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Api(api) => api.retry_policy(),
            Self::Generation { .. } | Self::Broker { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            Self::NotFound { .. }
            | Self::InvalidTarget { .. }
            | Self::ValidationFailed { .. }
            | Self::AuthFailure { .. }
            | Self::WriteDenied { .. }
            | Self::Persistence { .. }
            | Self::Cancelled { .. }
            | Self::RetriesExhausted { .. }
            | Self::Configuration { .. } => RetryPolicy::NonRetryable,
        }
    }
}
