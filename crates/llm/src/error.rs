//! Failures talking to the content generator.

use std::time::Duration;

use pipeline::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Network failure or timeout before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected (401/403).
    #[error("generator rejected credentials ({status})")]
    Auth { status: u16 },

    /// Rate limited (429).
    #[error("generator quota exceeded")]
    Quota { retry_after: Option<Duration> },

    /// 5xx from the generator.
    #[error("generator outage ({status})")]
    Outage {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx status.
    #[error("generator returned {status}: {body}")]
    Status { status: u16, body: String },

    /// `{success: false, error}`.
    #[error("{0}")]
    Unsuccessful(String),

    /// The body was not a generation response.
    #[error("malformed generator response: {0}")]
    Malformed(String),

    #[error("misconfigured generator client: {0}")]
    Misconfiguration(String),
}

impl From<GeneratorError> for DeliveryError {
    fn from(error: GeneratorError) -> Self {
        match error {
            GeneratorError::Transport(message) => DeliveryError::transient(message),
            GeneratorError::Quota { retry_after } | GeneratorError::Outage { retry_after, .. } => {
                DeliveryError::Transient {
                    message: error.to_string(),
                    retry_after,
                }
            }
            GeneratorError::Auth { status } => DeliveryError::AuthFailure {
                message: format!("content generator rejected credentials ({status})"),
            },
            GeneratorError::Misconfiguration(message) => DeliveryError::Configuration { message },
            other => DeliveryError::Generation {
                message: other.to_string(),
            },
        }
    }
}
