/* src/server/core/rust/src/snapshot.rs */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::CookieOp;

pub fn now_ms() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffects {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub redirect_url: Option<String>,
  #[serde(default)]
  pub cookies: Vec<CookieOp>,
}

/// Result of one successful static build of a path. Replaced wholesale,
/// never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticSnapshot {
  pub path: String,
  pub tree: serde_json::Value,
  pub revalidate_seconds: Option<u64>,
  pub generated_at_ms: u64,
  pub status: u16,
  #[serde(default)]
  pub side_effects: SideEffects,
}

impl StaticSnapshot {
  /// Never stale without a revalidate interval.
  pub fn is_stale(&self, now_ms: u64) -> bool {
    match self.revalidate_seconds {
      Some(secs) => now_ms.saturating_sub(self.generated_at_ms) >= secs.saturating_mul(1000),
      None => false,
    }
  }
}

/// Process-wide path -> snapshot map.
#[derive(Debug, Default)]
pub struct SnapshotStore {
  entries: RwLock<HashMap<String, Arc<StaticSnapshot>>>,
}

impl SnapshotStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, path: &str) -> Option<Arc<StaticSnapshot>> {
    self.entries.read().get(path).cloned()
  }

  /// Replace whatever was stored for the snapshot's path.
  pub fn insert(&self, snapshot: StaticSnapshot) {
    self.entries.write().insert(snapshot.path.clone(), Arc::new(snapshot));
  }

  pub fn remove(&self, path: &str) -> Option<Arc<StaticSnapshot>> {
    self.entries.write().remove(path)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.entries.read().contains_key(path)
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
