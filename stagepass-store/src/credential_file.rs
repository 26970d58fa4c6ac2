use async_trait::async_trait;
use serde_json::{Map, Value};
use stagepass_core::{CoreError, CoreResult, Credential, CredentialStore};
use stagepass_shared::Masked;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

const TOKEN_SLOT: &str = "token";

/// Key-value JSON file with the bearer token in the `token` slot.
/// Other keys in the file are left alone.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_slots(&self) -> CoreResult<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(storage_error(&self.path, e)),
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(slots)) => Ok(slots),
            _ => {
                warn!("Credential file {} is not a JSON object, ignoring it", self.path.display());
                Ok(Map::new())
            }
        }
    }

    async fn write_slots(&self, slots: Map<String, Value>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| storage_error(parent, e))?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(slots))
            .map_err(|e| CoreError::ValidationError(e.to_string()))?;
        fs::write(&self.path, body).await.map_err(|e| storage_error(&self.path, e))
    }
}

fn storage_error(path: &std::path::Path, err: std::io::Error) -> CoreError {
    CoreError::ServiceUnavailable(format!("credential file {}: {}", path.display(), err))
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> CoreResult<Option<Credential>> {
        let slots = self.read_slots().await?;
        Ok(slots
            .get(TOKEN_SLOT)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(Masked::from))
    }

    async fn save(&self, token: &Credential) -> CoreResult<()> {
        let mut slots = self.read_slots().await?;
        slots.insert(TOKEN_SLOT.to_string(), Value::String(token.expose().clone()));
        self.write_slots(slots).await
    }

    async fn remove(&self) -> CoreResult<()> {
        let mut slots = self.read_slots().await?;
        if slots.remove(TOKEN_SLOT).is_some() {
            self.write_slots(slots).await?;
        }
        Ok(())
    }
}
