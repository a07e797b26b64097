//! Counter snapshots on disk.
//!
//! Each counter has an interim `<name>.temp.json` rewritten every reporting
//! tick, and a `<name>.json` / `<name>.previous.json` pair rotated once per run.

use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use voluspa_common::ScrapeResult;

pub const TRIUMPHS: &str = "triumphs";
pub const COLLECTIONS: &str = "collections";
pub const PARALLEL_PROGRAM: &str = "parallel-program";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{name}{suffix}"))
    }

    pub async fn write_interim<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> ScrapeResult<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path(name, ".temp.json"), serde_json::to_vec(value)?).await?;
        Ok(())
    }

    /// Move the current snapshot to `previous` (when one exists) and write
    /// `value` as the new current snapshot.
    pub async fn rotate<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> ScrapeResult<()> {
        fs::create_dir_all(&self.dir).await?;
        let current = self.path(name, ".json");
        if fs::try_exists(&current).await? {
            fs::copy(&current, self.path(name, ".previous.json")).await?;
        } else {
            debug!(snapshot = name, "no current snapshot to rotate");
        }
        fs::write(&current, serde_json::to_vec(value)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn interim_uses_temp_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let counts = BTreeMap::from([(12u32, 4u64)]);

        store.write_interim(TRIUMPHS, &counts).await.unwrap();
        let body = tokio::fs::read_to_string(dir.path().join("triumphs.temp.json"))
            .await
            .unwrap();
        assert_eq!(body, r#"{"12":4}"#);
    }

    #[tokio::test]
    async fn rotate_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.rotate(COLLECTIONS, &BTreeMap::from([(1u32, 1u64)])).await.unwrap();
        assert!(!dir.path().join("collections.previous.json").exists());

        store.rotate(COLLECTIONS, &BTreeMap::from([(1u32, 2u64)])).await.unwrap();
        let previous = std::fs::read_to_string(dir.path().join("collections.previous.json")).unwrap();
        let current = std::fs::read_to_string(dir.path().join("collections.json")).unwrap();
        assert_eq!(previous, r#"{"1":1}"#);
        assert_eq!(current, r#"{"1":2}"#);
    }
}
