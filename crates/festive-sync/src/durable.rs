//! # Durable Documents
//!
//! Whole-document JSON files in the terminal's data directory.
//!
//! ```text
//! write(value)
//!   │
//!   ├── serialize to JSON
//!   ├── write  <name>.json.tmp
//!   └── rename <name>.json.tmp → <name>.json   (atomic replace)
//! ```
//!
//! A crash mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::SyncResult;

#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonDocument { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Reads the document.
    ///
    /// ## Returns
    /// * `Ok(None)` - The file does not exist yet
    /// * `Err(SerializationFailed)` - The file exists but is not valid JSON
    pub async fn read<T: DeserializeOwned>(&self) -> SyncResult<Option<T>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// Replaces the document atomically.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> SyncResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(value)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Document written");
        Ok(())
    }

    /// Moves an unreadable document aside so it is not overwritten.
    pub async fn quarantine(&self) -> SyncResult<PathBuf> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", chrono::Utc::now().format("%Y%m%d%H%M%S")));
        let target = PathBuf::from(name);

        fs::rename(&self.path, &target).await?;
        warn!(from = %self.path.display(), to = %target.display(), "Quarantined unreadable document");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_document_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let doc = JsonDocument::new(dir.path().join("absent.json"));
        let value: Option<Vec<String>> = doc.read().await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let doc = JsonDocument::new(dir.path().join("sub").join("doc.json"));

        doc.write(&vec![1, 2, 3]).await.unwrap();
        doc.write(&vec![4]).await.unwrap();

        let value: Vec<i32> = doc.read().await.unwrap().unwrap();
        assert_eq!(value, vec![4]);
        assert!(!doc.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error_and_can_be_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, b"{not json").unwrap();

        let doc = JsonDocument::new(&path);
        assert!(doc.read::<Vec<i32>>().await.is_err());

        let moved = doc.quarantine().await.unwrap();
        assert!(moved.exists());
        assert!(!path.exists());
    }
}
