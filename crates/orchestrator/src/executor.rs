//! The delivery orchestrator: six stages in strict sequence.
//!
//! ```text
//! initialize (5) ─▶ tailor (15) ─▶ generate (35) ─▶ optimize (50) ─▶ deliver (70) ─▶ complete (95→100)
//! ```
//!
//! Cancellation is checked before every stage and before every retry attempt.
//! An unrecovered error emits one final `error` progress event and is returned
//! after the delivery has been unregistered.

use std::sync::Arc;

use pipeline::{
    BoardClientFactory, ContentGenerator, CredentialProvider, DeliveryError, DeliveryId,
    DeliveryProgress, DeliveryResult, DeliveryStage, DeliveryTarget, Destination, ImportBroker,
    PayloadNormalizer, PromptId, PromptStore, ResultSink,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::options::DeliveryOptions;
use crate::registry::{ensure_active, DeliveryRegistry};
use crate::retry::retry_with_backoff;
use crate::strategy::{
    DeliveryContext, DeliveryStrategies, DirectApiStrategy, EmbedOptions, EphemeralImportStrategy,
};
use crate::tailoring::Tailor;

/// Every external collaborator the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Source of prompt records.
    pub prompts: Arc<dyn PromptStore>,
    /// Connections and access tokens for direct-API destinations.
    pub credentials: Arc<dyn CredentialProvider>,
    /// AI generator used for tailoring.
    pub generator: Arc<dyn ContentGenerator>,
    /// Payload builder, optimizer and validator.
    pub normalizer: Arc<dyn PayloadNormalizer>,
    /// Builds board clients from access tokens.
    pub boards: Arc<dyn BoardClientFactory>,
    /// Stages ephemeral imports.
    pub broker: Arc<dyn ImportBroker>,
    /// Stores finished results.
    pub sink: Arc<dyn ResultSink>,
}

/// Runs deliveries. Construct once and share; every delivery is isolated by
/// its own id and cancellation token.
pub struct DeliveryOrchestrator {
    prompts: Arc<dyn PromptStore>,
    credentials: Arc<dyn CredentialProvider>,
    normalizer: Arc<dyn PayloadNormalizer>,
    sink: Arc<dyn ResultSink>,
    tailor: Tailor,
    strategies: DeliveryStrategies,
    registry: DeliveryRegistry,
}

impl DeliveryOrchestrator {
    /// Builds an orchestrator with default embed options and its own registry.
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_registry(collaborators, EmbedOptions::default(), DeliveryRegistry::new())
    }

    /// Builds an orchestrator around an externally owned registry, e.g. one
    /// tied to a process-wide shutdown token.
    pub fn with_registry(
        collaborators: Collaborators,
        embed: EmbedOptions,
        registry: DeliveryRegistry,
    ) -> Self {
        let Collaborators {
            prompts,
            credentials,
            generator,
            normalizer,
            boards,
            broker,
            sink,
        } = collaborators;

        Self {
            strategies: DeliveryStrategies {
                direct: DirectApiStrategy::new(Arc::clone(&credentials), boards, embed),
                import: EphemeralImportStrategy::new(broker),
            },
            tailor: Tailor::new(generator),
            prompts,
            credentials,
            normalizer,
            sink,
            registry,
        }
    }

    /// Delivers the output of `prompt_id` to `target`.
    ///
    /// The first progress event carries the new delivery id under
    /// `details.deliveryId`.
    ///
    /// # Errors
    ///
    /// Any unrecovered [`DeliveryError`]; `Cancelled` if
    /// [`cancel_delivery`](Self::cancel_delivery) was called for this delivery.
    pub async fn execute_delivery<F>(
        &self,
        prompt_id: &PromptId,
        target: DeliveryTarget,
        options: &DeliveryOptions,
        on_progress: F,
    ) -> Result<DeliveryResult, DeliveryError>
    where
        F: Fn(DeliveryProgress) + Send + Sync,
    {
        let delivery_id = DeliveryId::new_random();
        let registration = self.registry.register(delivery_id);
        let span = info_span!(
            "delivery",
            %delivery_id,
            %prompt_id,
            destination = %target.destination,
            target_id = %target.target_id
        );

        let outcome = self
            .run_stages(
                delivery_id,
                prompt_id,
                &target,
                options,
                registration.token(),
                &on_progress,
            )
            .instrument(span.clone())
            .await;

        if let Err(error) = &outcome {
            span.in_scope(|| warn!(%error, "Delivery failed"));
            on_progress(DeliveryProgress::at(DeliveryStage::Error, error.to_string()));
        }
        drop(registration);
        outcome
    }

    /// Signals and unregisters a delivery. Returns `false` if it was not active.
    pub fn cancel_delivery(&self, delivery_id: DeliveryId) -> bool {
        let cancelled = self.registry.cancel(delivery_id);
        if cancelled {
            info!(%delivery_id, "Delivery cancelled");
        }
        cancelled
    }

    /// Ids of deliveries currently in flight.
    pub fn active_deliveries(&self) -> Vec<DeliveryId> {
        self.registry.active()
    }

    /// Cancels every in-flight delivery. Deliveries started afterwards are
    /// cancelled before their first stage.
    pub fn shutdown(&self) {
        self.registry.cancel_all();
    }

    async fn run_stages<F>(
        &self,
        delivery_id: DeliveryId,
        prompt_id: &PromptId,
        target: &DeliveryTarget,
        options: &DeliveryOptions,
        token: &CancellationToken,
        on_progress: &F,
    ) -> Result<DeliveryResult, DeliveryError>
    where
        F: Fn(DeliveryProgress) + Send + Sync,
    {
        // 1. initialize
        ensure_active(token, delivery_id)?;
        on_progress(
            DeliveryProgress::at(DeliveryStage::Initialize, "Initializing delivery")
                .with_details(json!({ "deliveryId": delivery_id.to_string() })),
        );
        let prompt = self.prompts.get(prompt_id).await?;
        self.validate_target(target).await?;

        // 2. tailor
        ensure_active(token, delivery_id)?;
        on_progress(DeliveryProgress::at(
            DeliveryStage::Tailor,
            format!("Tailoring content for {}", target.destination),
        ));
        let tailored = self
            .tailor
            .tailor_for_destination(&prompt, target.destination)
            .await;

        // 3. generate
        ensure_active(token, delivery_id)?;
        on_progress(DeliveryProgress::at(
            DeliveryStage::Generate,
            "Generating delivery payload",
        ));
        let payload = retry_with_backoff(
            |_| {
                self.normalizer
                    .generate_delivery_payload(&tailored, target, &prompt.content)
            },
            options.max_retries,
            options.retry_delay(),
            token,
            delivery_id,
        )
        .await?;

        // 4. optimize / validate
        ensure_active(token, delivery_id)?;
        on_progress(DeliveryProgress::at(
            DeliveryStage::Optimize,
            "Optimizing and validating payload",
        ));
        let generated_items = payload.items.len();
        let payload = if options.optimize_payload {
            self.normalizer.optimize_payload_for_destination(payload)
        } else {
            payload
        };
        let dropped_items = generated_items.saturating_sub(payload.items.len());
        if dropped_items > 0 {
            warn!(
                generated = generated_items,
                dropped = dropped_items,
                "Optimizer dropped items"
            );
        }
        if options.validate_before_delivery {
            let report = self.normalizer.validate_delivery_payload(&payload);
            if !report.is_valid() {
                return Err(DeliveryError::ValidationFailed {
                    violations: report.errors,
                });
            }
        }

        // 5. deliver
        ensure_active(token, delivery_id)?;
        on_progress(
            DeliveryProgress::at(
                DeliveryStage::Deliver,
                format!("Delivering {} items to {}", payload.items.len(), target.destination),
            )
            .with_details(json!({ "totalItems": payload.items.len() })),
        );
        let ctx = DeliveryContext {
            delivery_id,
            target,
            prompt: &prompt,
            tailored: &tailored,
            payload: &payload,
        };
        let mut result = retry_with_backoff(
            |_| self.strategies.dispatch(&ctx),
            options.max_retries,
            options.delivery_retry_delay(),
            token,
            delivery_id,
        )
        .await?;
        result.metadata.content_fallback = tailored.metadata.fallback;
        result.metadata.model = tailored.metadata.model.clone();
        if dropped_items > 0 {
            result.push_warning(format!(
                "{dropped_items} of {generated_items} items dropped by the {} optimizer",
                target.destination
            ));
        }

        // 6. complete
        ensure_active(token, delivery_id)?;
        on_progress(DeliveryProgress::at(
            DeliveryStage::Complete,
            "Saving delivery result",
        ));
        self.persist(&result).await;
        on_progress(
            DeliveryProgress::at(DeliveryStage::Complete, "Delivery complete").with_progress(100),
        );

        info!(
            status = result.status.as_str(),
            delivered = result.delivered_items,
            total = result.total_items,
            "Delivery finished"
        );
        Ok(result)
    }

    /// Collects every problem with `target` into one `InvalidTarget` error.
    async fn validate_target(&self, target: &DeliveryTarget) -> Result<(), DeliveryError> {
        let mut violations = Vec::new();
        if target.target_id.trim().is_empty() {
            violations.push("Target ID is required".to_string());
        }
        match target.destination {
            Destination::DirectApi(kind) => {
                let connected = self
                    .credentials
                    .connection(kind)
                    .await
                    .is_some_and(|connection| connection.active);
                if !connected {
                    violations.push(format!("No active {} connection", kind.as_str()));
                }
            }
            Destination::EphemeralImport(_) => {}
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DeliveryError::InvalidTarget { violations })
        }
    }

    async fn persist(&self, result: &DeliveryResult) {
        if let Err(error) = self.sink.persist(result).await {
            warn!(%error, "Failed to persist delivery result; continuing");
        }
    }
}
