//! Tailoring: turning prompt output into destination-appropriate content.
//!
//! Stored prompt output is reused verbatim when it already holds entries.
//! Otherwise the AI content generator is asked; if it fails in any way a
//! fixed per-destination template is filled in with the prompt's
//! framework/stage/tool names so the pipeline never stalls on AI availability.

use std::sync::Arc;

use pipeline::{
    ContentGenerator, Destination, DirectApiKind, GenerationRequest, ImportKind, PromptContext,
    PromptRecord, TailoredContent, TailoringMetadata, Timestamp,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

/// Tailors prompts via the AI content generator with deterministic fallback.
#[derive(Clone)]
pub struct Tailor {
    generator: Arc<dyn ContentGenerator>,
}

impl Tailor {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    /// Produces tailored content for `destination`. Never fails.
    #[instrument(skip_all, fields(prompt_id = %prompt.id, destination = %destination))]
    pub async fn tailor_for_destination(
        &self,
        prompt: &PromptRecord,
        destination: Destination,
    ) -> TailoredContent {
        if let Some(output) = prompt.output.as_ref().filter(|output| output.has_entries()) {
            debug!(entries = output.entries().len(), "Reusing stored prompt output");
            return output.clone();
        }

        let request = GenerationRequest {
            prompt: prompt.content.clone(),
            destination,
            context: prompt.context.clone(),
            variables: prompt.variables.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(content) if content.has_entries() => {
                info!(
                    entries = content.entries().len(),
                    model = content.metadata.model.as_deref().unwrap_or("unknown"),
                    "Content tailored by generator"
                );
                content
            }
            Ok(_) => {
                warn!("Generator returned no entries; using fallback content");
                fallback_content(destination, &prompt.context)
            }
            Err(error) => {
                warn!(%error, "Generator unavailable; using fallback content");
                fallback_content(destination, &prompt.context)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback templates
// ---------------------------------------------------------------------------

struct ContextNames<'a> {
    framework: &'a str,
    stage: &'a str,
    tool: &'a str,
}

impl<'a> ContextNames<'a> {
    fn of(context: &'a PromptContext) -> Self {
        Self {
            framework: context.framework.as_deref().unwrap_or("Framework"),
            stage: context.stage.as_deref().unwrap_or("Stage"),
            tool: context.tool.as_deref().unwrap_or("Tool"),
        }
    }
}

/// Deterministic content for `destination`, marked `metadata.fallback = true`.
pub fn fallback_content(destination: Destination, context: &PromptContext) -> TailoredContent {
    let names = ContextNames::of(context);
    let content = match destination {
        Destination::DirectApi(DirectApiKind::Miro) => board_template(&names),
        Destination::EphemeralImport(ImportKind::Figma) => design_template(&names),
    };
    let item_count = ["items", "uiBlocks"]
        .iter()
        .find_map(|key| content.get(*key).and_then(Value::as_array))
        .map_or(0, Vec::len);

    TailoredContent {
        content,
        metadata: TailoringMetadata {
            generated_at: Some(Timestamp::now()),
            model: None,
            item_count,
            fallback: true,
        },
    }
}

fn board_template(names: &ContextNames<'_>) -> Value {
    let sticky = |text: String, fill: &str| {
        json!({ "type": "sticky", "text": text, "style": { "fillColor": fill } })
    };
    json!({
        "summary": format!("{} workshop board for the {} stage", names.framework, names.stage),
        "items": [
            {
                "type": "text",
                "text": format!("{}: {}", names.framework, names.stage),
                "style": { "fontSize": 36 }
            },
            sticky(format!("Tool: {}", names.tool), "light_blue"),
            sticky(format!("Goal of the {} stage", names.stage), "light_yellow"),
            sticky("Key insights".to_string(), "light_green"),
            sticky("Open questions".to_string(), "light_pink"),
            sticky(format!("Next steps with {}", names.tool), "orange"),
        ]
    })
}

fn design_template(names: &ContextNames<'_>) -> Value {
    json!({
        "summary": format!("{} layout for the {} stage", names.tool, names.stage),
        "uiBlocks": [
            { "type": "frame", "text": format!("{} / {}", names.framework, names.stage) },
            { "type": "heading", "text": format!("{}: {}", names.framework, names.stage) },
            { "type": "text", "text": format!("Working with {}", names.tool) },
            { "type": "shape", "text": "Primary content area" },
            { "type": "text", "text": "Replace this block with your generated output" },
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline::{DeliveryError, PromptId};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingGenerator;

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate(&self, _: &GenerationRequest) -> Result<TailoredContent, DeliveryError> {
            Err(DeliveryError::Generation {
                message: "model overloaded".into(),
            })
        }
    }

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentGenerator for CountingGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<TailoredContent, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TailoredContent {
                content: json!({ "items": [{ "type": "sticky", "text": request.prompt }] }),
                metadata: TailoringMetadata {
                    model: Some("test-model".into()),
                    item_count: 1,
                    ..TailoringMetadata::default()
                },
            })
        }
    }

    fn prompt(output: Option<TailoredContent>) -> PromptRecord {
        PromptRecord {
            id: PromptId::new("p1").unwrap(),
            content: "Map the customer journey".into(),
            variables: BTreeMap::new(),
            context: PromptContext {
                framework: Some("Design Thinking".into()),
                stage: Some("Empathize".into()),
                tool: Some("Journey Map".into()),
            },
            output,
        }
    }

    #[tokio::test]
    async fn figma_falls_back_to_ui_blocks_when_generator_fails() {
        let tailor = Tailor::new(Arc::new(FailingGenerator));
        let content = tailor
            .tailor_for_destination(&prompt(None), Destination::EphemeralImport(ImportKind::Figma))
            .await;

        let blocks = content.content["uiBlocks"].as_array().unwrap();
        assert!(!blocks.is_empty());
        assert!(content.metadata.fallback);
        assert_eq!(content.metadata.item_count, blocks.len());
        assert!(blocks[1]["text"].as_str().unwrap().contains("Design Thinking"));
    }

    #[tokio::test]
    async fn miro_fallback_names_framework_stage_and_tool() {
        let tailor = Tailor::new(Arc::new(FailingGenerator));
        let content = tailor
            .tailor_for_destination(&prompt(None), Destination::DirectApi(DirectApiKind::Miro))
            .await;

        let text = content.content.to_string();
        assert!(text.contains("Design Thinking"));
        assert!(text.contains("Empathize"));
        assert!(text.contains("Journey Map"));
        assert!(content.metadata.fallback);
    }

    #[tokio::test]
    async fn stored_output_is_reused_without_calling_generator() {
        let generator = Arc::new(CountingGenerator::default());
        let tailor = Tailor::new(generator.clone());
        let stored = TailoredContent {
            content: json!({ "items": [{ "type": "text", "text": "stored" }] }),
            metadata: TailoringMetadata::default(),
        };

        let content = tailor
            .tailor_for_destination(
                &prompt(Some(stored.clone())),
                Destination::DirectApi(DirectApiKind::Miro),
            )
            .await;

        assert_eq!(content, stored);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_stored_output_goes_to_generator() {
        let generator = Arc::new(CountingGenerator::default());
        let tailor = Tailor::new(generator.clone());
        let empty = TailoredContent {
            content: json!({ "items": [] }),
            metadata: TailoringMetadata::default(),
        };

        let content = tailor
            .tailor_for_destination(&prompt(Some(empty)), Destination::DirectApi(DirectApiKind::Miro))
            .await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(!content.metadata.fallback);
        assert_eq!(content.metadata.model.as_deref(), Some("test-model"));
    }
}
