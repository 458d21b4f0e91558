//! Local collaborators: prompts from disk, credentials from the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use pipeline::{
    AccessToken, Connection, CredentialProvider, DeliveryError, DirectApiKind, PromptContext,
    PromptId, PromptRecord, PromptStore, TailoredContent,
};
use serde::Deserialize;
use tracing::debug;

/// Prompt file layout: `<dir>/<prompt-id>.json`.
#[derive(Debug, Deserialize)]
struct PromptFile {
    content: String,
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default)]
    context: PromptContext,
    #[serde(default)]
    output: Option<TailoredContent>,
}

pub struct FilePromptStore {
    dir: PathBuf,
}

impl FilePromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PromptStore for FilePromptStore {
    async fn get(&self, id: &PromptId) -> Result<PromptRecord, DeliveryError> {
        let not_found = || DeliveryError::NotFound {
            what: "Prompt".to_string(),
            id: id.to_string(),
        };
        let name = id.as_str();
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(not_found());
        }

        let path = self.dir.join(format!("{name}.json"));
        debug!(path = %path.display(), "Loading prompt");
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(DeliveryError::Configuration {
                    message: format!("failed to read {}: {e}", path.display()),
                })
            }
        };
        let file: PromptFile =
            serde_json::from_str(&text).map_err(|e| DeliveryError::Configuration {
                message: format!("invalid prompt file {}: {e}", path.display()),
            })?;

        Ok(PromptRecord {
            id: id.clone(),
            content: file.content,
            variables: file.variables,
            context: file.context,
            output: file.output,
        })
    }
}

/// Miro credentials taken from a single environment-provided token.
pub struct EnvCredentialProvider {
    miro: Option<AccessToken>,
    token_env: String,
}

impl EnvCredentialProvider {
    pub fn new(miro: Option<AccessToken>, token_env: impl Into<String>) -> Self {
        Self {
            miro,
            token_env: token_env.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn connection(&self, kind: DirectApiKind) -> Option<Connection> {
        match kind {
            DirectApiKind::Miro => self.miro.as_ref().map(|_| Connection {
                kind,
                account_id: None,
                active: true,
            }),
        }
    }

    async fn valid_access_token(&self, kind: DirectApiKind) -> Result<AccessToken, DeliveryError> {
        match kind {
            DirectApiKind::Miro => self.miro.clone().ok_or_else(|| DeliveryError::AuthFailure {
                message: format!("{} is not set", self.token_env),
            }),
        }
    }
}
