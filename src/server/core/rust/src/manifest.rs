/* src/server/core/rust/src/manifest.rs */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::artifacts::{RetryPolicy, rename_with_retry, tmp_path};
use crate::errors::{Result, RouterError};

pub const STATUS_MANIFEST_FILE: &str = "status-manifest.json";

/// `<dist>/status-manifest.json`: path -> last HTTP status of its artifact.
#[derive(Debug)]
pub struct StatusManifest {
  file: PathBuf,
  entries: Mutex<BTreeMap<String, u16>>,
  // Serialises persists so two writers never share the temp file.
  write: tokio::sync::Mutex<()>,
}

impl StatusManifest {
  pub fn empty(dist_dir: &Path) -> Self {
    Self {
      file: dist_dir.join(STATUS_MANIFEST_FILE),
      entries: Mutex::new(BTreeMap::new()),
      write: tokio::sync::Mutex::new(()),
    }
  }

  /// Load the manifest from `dist_dir`; a missing file is an empty manifest.
  pub fn load(dist_dir: &Path) -> Result<Self> {
    let manifest = Self::empty(dist_dir);
    let content = match std::fs::read_to_string(&manifest.file) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(manifest),
      Err(e) => {
        return Err(RouterError::io(format!("failed to read {}", manifest.file.display()), e));
      }
    };
    let entries: BTreeMap<String, u16> = serde_json::from_str(&content)?;
    *manifest.entries.lock() = entries;
    Ok(manifest)
  }

  pub fn file(&self) -> &Path {
    &self.file
  }

  pub fn get(&self, path: &str) -> Option<u16> {
    self.entries.lock().get(path).copied()
  }

  /// Record `status` for `path`. Returns whether the stored value changed.
  pub fn set(&self, path: &str, status: u16) -> bool {
    let previous = self.entries.lock().insert(path.to_string(), status);
    previous != Some(status)
  }

  pub fn remove(&self, path: &str) -> bool {
    self.entries.lock().remove(path).is_some()
  }

  pub fn entries(&self) -> BTreeMap<String, u16> {
    self.entries.lock().clone()
  }

  /// Write the manifest through a temp file and rename.
  pub async fn persist(&self) -> Result<()> {
    let _guard = self.write.lock().await;
    let json = serde_json::to_string_pretty(&self.entries())?;
    if let Some(parent) = self.file.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| RouterError::io(format!("failed to create {}", parent.display()), e))?;
    }
    let tmp = tmp_path(&self.file);
    tokio::fs::write(&tmp, json)
      .await
      .map_err(|e| RouterError::io(format!("failed to write {}", tmp.display()), e))?;
    rename_with_retry(&tmp, &self.file, RetryPolicy::default()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_reports_changes_only() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = StatusManifest::empty(dir.path());
    assert!(manifest.set("/a", 200));
    assert!(!manifest.set("/a", 200));
    assert!(manifest.set("/a", 404));
    assert_eq!(manifest.get("/a"), Some(404));
  }

  #[tokio::test]
  async fn persist_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = StatusManifest::empty(dir.path());
    manifest.set("/", 200);
    manifest.set("/missing", 404);
    manifest.persist().await.unwrap();
    assert!(!tmp_path(manifest.file()).exists());

    let loaded = StatusManifest::load(dir.path()).unwrap();
    assert_eq!(loaded.get("/missing"), Some(404));
    assert_eq!(loaded.entries().len(), 2);
  }

  #[test]
  fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(StatusManifest::load(dir.path()).unwrap().entries().is_empty());
  }

  #[test]
  fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(STATUS_MANIFEST_FILE), "{not json").unwrap();
    assert!(matches!(StatusManifest::load(dir.path()), Err(RouterError::Json(_))));
  }
}
