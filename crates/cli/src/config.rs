//! `presenter.toml` loading.
//!
//! Every section is optional; missing keys take their defaults. Secrets are
//! never read from the file, only the *names* of the environment variables
//! that hold them.

use std::path::Path;

use anyhow::Context;
use import_broker::BrokerConfig;
use llm::GeneratorConfig;
use miro::MiroConfig;
use orchestrator::{DeliveryOptions, EmbedOptions};
use pipeline::AccessToken;
use results::ResultsConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "presenter.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenterConfig {
    pub delivery: DeliveryOptions,
    pub miro: MiroSection,
    pub generator: GeneratorConfig,
    pub broker: BrokerConfig,
    pub results: ResultsConfig,
    pub prompts: PromptsConfig,
}

/// `[miro]`: client settings plus embed URL options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiroSection {
    #[serde(flatten)]
    pub client: MiroConfig,
    pub embed: EmbedOptions,
    pub token_env: String,
}

impl Default for MiroSection {
    fn default() -> Self {
        Self {
            client: MiroConfig::default(),
            embed: EmbedOptions::default(),
            token_env: "MIRO_ACCESS_TOKEN".to_string(),
        }
    }
}

/// `[prompts]`: where prompt JSON files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub dir: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: "prompts".to_string(),
        }
    }
}

impl PresenterConfig {
    /// Loads `path`. A missing file at the default location yields defaults;
    /// a missing file anywhere else is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Reads a secret from the environment variable `name`. Empty values count as
/// unset.
pub fn read_secret(name: &str) -> Option<AccessToken> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(AccessToken::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(PresenterConfig::parse("").unwrap(), PresenterConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = PresenterConfig::parse(
            r#"
            [delivery]
            max_retries = 5
            optimize_payload = false

            [miro]
            base_url = "https://miro.internal/v2"
            item_delay_ms = 250

            [miro.embed]
            autoplay = false

            [prompts]
            dir = "/var/lib/presenter/prompts"
            "#,
        )
        .unwrap();

        assert_eq!(config.delivery.max_retries, 5);
        assert_eq!(config.delivery.retry_delay_ms, 1000);
        assert!(!config.delivery.optimize_payload);
        assert_eq!(config.miro.client.base_url, "https://miro.internal/v2");
        assert_eq!(config.miro.client.item_delay_ms, 250);
        assert!(!config.miro.embed.autoplay);
        assert_eq!(config.miro.embed.mode, "live-embed");
        assert_eq!(config.miro.token_env, "MIRO_ACCESS_TOKEN");
        assert_eq!(config.prompts.dir, "/var/lib/presenter/prompts");
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(PresenterConfig::parse("[figma]\ntoken = \"x\"").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(PresenterConfig::load(Path::new("/nonexistent/presenter.toml")).is_err());
    }
}
