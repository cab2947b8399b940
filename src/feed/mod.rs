pub mod json_file;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use types::Snapshot;

/// Delivers a materialized snapshot of collector output.
///
/// Fetching and persistence live behind this trait; the engine only ever
/// sees the finished snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;
    fn describe(&self) -> String;
}
