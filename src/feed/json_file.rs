use super::types::Snapshot;
use super::SnapshotSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Snapshot stored as a single JSON document.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for JsonFileSource {
    async fn load(&self) -> Result<Snapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot: {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot JSON: {}", self.path.display()))?;
        tracing::info!(
            source = %self.path.display(),
            entities = snapshot.entities.len(),
            games = snapshot.games.len(),
            observations = snapshot.observations.len(),
            quotes = snapshot.quotes.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
