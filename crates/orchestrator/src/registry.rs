//! Registry of in-flight deliveries and their cancellation tokens.
//!
//! The registry is the only mutable state shared between concurrent
//! deliveries. A delivery is inserted when it starts and removed when its
//! [`RegistrationGuard`] drops, which happens on success, error and unwind
//! alike. Every token is a child of the registry's shutdown token, so
//! [`DeliveryRegistry::cancel_all`] reaches every delivery at once.

use std::sync::Arc;

use dashmap::DashMap;
use pipeline::{DeliveryError, DeliveryId};
use tokio_util::sync::CancellationToken;

/// Map of delivery id → cancellation token.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRegistry {
    tokens: Arc<DashMap<DeliveryId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl DeliveryRegistry {
    /// Creates an empty registry with its own shutdown token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose deliveries are all cancelled when `shutdown` is.
    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self {
            tokens: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    /// Registers `id` and returns the guard that owns its token.
    pub fn register(&self, id: DeliveryId) -> RegistrationGuard {
        let token = self.shutdown.child_token();
        self.tokens.insert(id, token.clone());
        RegistrationGuard {
            id,
            token,
            tokens: Arc::clone(&self.tokens),
        }
    }

    /// Signals and unregisters `id`. Returns `false` if it was not active.
    pub fn cancel(&self, id: DeliveryId) -> bool {
        match self.tokens.remove(&id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every active delivery.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Ids of the deliveries currently registered.
    pub fn active(&self) -> Vec<DeliveryId> {
        self.tokens.iter().map(|entry| *entry.key()).collect()
    }

    /// Whether `id` is still registered.
    pub fn is_active(&self, id: DeliveryId) -> bool {
        self.tokens.contains_key(&id)
    }
}

/// Keeps a delivery registered for as long as it lives.
#[derive(Debug)]
pub struct RegistrationGuard {
    id: DeliveryId,
    token: CancellationToken,
    tokens: Arc<DashMap<DeliveryId, CancellationToken>>,
}

impl RegistrationGuard {
    /// The registered delivery.
    pub fn id(&self) -> DeliveryId {
        self.id
    }

    /// Token signalled when the delivery is cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.tokens.remove(&self.id);
    }
}

/// Fails with [`DeliveryError::Cancelled`] once `token` has been signalled.
pub fn ensure_active(token: &CancellationToken, delivery_id: DeliveryId) -> Result<(), DeliveryError> {
    if token.is_cancelled() {
        Err(DeliveryError::Cancelled { delivery_id })
    } else {
        Ok(())
    }
}
