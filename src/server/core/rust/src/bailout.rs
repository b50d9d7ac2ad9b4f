/* src/server/core/rust/src/bailout.rs */

// Static bailout detection. During a build pass the request-scoped maps
// (cookies, headers, query) are wrapped so that any read, enumeration or
// existence check flips the page's static flag. Values are still returned
// unchanged; the page renders normally, it just stops being static.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  Get,
  Has,
  Keys,
}

pub type AccessCallback = Arc<dyn Fn(Access, Option<&str>) + Send + Sync>;

/// Per-attempt "still static" flag. Starts `true`.
#[derive(Clone, Debug)]
pub struct StaticFlag(Arc<AtomicBool>);

impl StaticFlag {
  pub fn new() -> Self {
    Self(Arc::new(AtomicBool::new(true)))
  }

  pub fn is_static(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }

  pub fn mark_dynamic(&self) {
    self.0.store(false, Ordering::Release);
  }

  /// Callback that marks this flag dynamic on any access.
  pub fn callback(&self, label: &'static str) -> AccessCallback {
    let flag = self.clone();
    Arc::new(move |access: Access, key: Option<&str>| {
      if flag.is_static() {
        tracing::debug!(map = label, ?access, key, "request-scoped data touched during build");
      }
      flag.mark_dynamic();
    })
  }
}

impl Default for StaticFlag {
  fn default() -> Self {
    Self::new()
  }
}

/// String map whose reads are observable. Writes are not tracked.
#[derive(Clone, Default)]
pub struct TrackedMap {
  inner: BTreeMap<String, String>,
  on_access: Option<AccessCallback>,
}

impl TrackedMap {
  /// Wrap `target` so every read goes through `on_access` first.
  pub fn wrap(target: BTreeMap<String, String>, on_access: AccessCallback) -> Self {
    Self { inner: target, on_access: Some(on_access) }
  }

  /// Plain map for live requests; nothing is observed.
  pub fn untracked(target: BTreeMap<String, String>) -> Self {
    Self { inner: target, on_access: None }
  }

  fn touch(&self, access: Access, key: Option<&str>) {
    if let Some(cb) = &self.on_access {
      cb(access, key);
    }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.touch(Access::Get, Some(key));
    self.inner.get(key).map(String::as_str)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.touch(Access::Has, Some(key));
    self.inner.contains_key(key)
  }

  pub fn keys(&self) -> Vec<&str> {
    self.touch(Access::Keys, None);
    self.inner.keys().map(String::as_str).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.touch(Access::Keys, None);
    self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.touch(Access::Keys, None);
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Record an access that happened somewhere the wrapper could not see,
  /// e.g. inside a render subprocess.
  pub fn note_external_access(&self) {
    self.touch(Access::Get, None);
  }

  /// Contents without firing the callback. Crate-internal: only used to
  /// ship the map to a render subprocess, which reports access back.
  pub(crate) fn raw(&self) -> &BTreeMap<String, String> {
    &self.inner
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.inner.insert(key.into(), value.into());
  }
}

impl fmt::Debug for TrackedMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TrackedMap")
      .field("len", &self.inner.len())
      .field("tracked", &self.on_access.is_some())
      .finish()
  }
}
