//! Per-delivery options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Knobs a caller may set for one `execute_delivery` call.
///
/// Every field has a default, so a partial `[delivery]` configuration table
/// deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    /// Retries after the first attempt of each retried stage.
    pub max_retries: u32,
    /// Base back-off in milliseconds. Doubled for the deliver stage.
    pub retry_delay_ms: u64,
    /// Run the destination-specific optimizer before delivery.
    pub optimize_payload: bool,
    /// Reject structurally invalid payloads before delivery.
    pub validate_before_delivery: bool,
}

impl DeliveryOptions {
    /// Base back-off as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Base back-off for the deliver stage, which is costlier to repeat.
    pub fn delivery_retry_delay(&self) -> Duration {
        self.retry_delay().saturating_mul(2)
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            optimize_payload: true,
            validate_before_delivery: true,
        }
    }
}
