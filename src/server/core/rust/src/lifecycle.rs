/* src/server/core/rust/src/lifecycle.rs */

// Incremental static generation. Paths are prerendered at startup under a
// bailout probe; stale snapshots are served immediately while a single
// background task rebuilds them through the temp + rename pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::artifacts::{ArtifactPaths, RetryPolicy};
use crate::bailout::StaticFlag;
use crate::compose::{Composer, RenderKind, RenderOutcome};
use crate::context::RequestContext;
use crate::errors::{Result, RouterError};
use crate::limiter::Limiter;
use crate::locator::{PagePattern, enumerate_pages, locate};
use crate::manifest::StatusManifest;
use crate::matcher::{FileKind, normalize_path, split_path};
use crate::render::{ClientManifest, PageExports, RenderContext};
use crate::snapshot::{SideEffects, SnapshotStore, StaticSnapshot, now_ms};
use crate::static_paths::expand_static_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
  /// Snapshot exists and has not expired.
  Fresh,
  /// Expired, nobody is rebuilding it yet.
  Stale,
  Regenerating,
  /// Served by live SSR only.
  Dynamic,
  Missing,
}

/// A snapshot hit. Artifacts are read lazily so callers fetch only the
/// representation they need.
#[derive(Debug, Clone)]
pub struct ServedSnapshot {
  pub snapshot: Arc<StaticSnapshot>,
  pub artifacts: ArtifactPaths,
  pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuilt {
  Committed { status: u16 },
  /// The page touched request data; the path is live-only from now on.
  Dynamic,
  /// Another task holds the regeneration lock.
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
  pub path: String,
  pub error: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct GenerationReport {
  pub generated: Vec<String>,
  pub dynamic: Vec<String>,
  pub failed: Vec<FailedPage>,
}

/// Held while a path regenerates; dropping it releases the path.
#[derive(Debug)]
pub struct RegenerationGuard {
  set: Arc<Mutex<HashSet<String>>>,
  path: String,
}

impl Drop for RegenerationGuard {
  fn drop(&mut self) {
    self.set.lock().remove(&self.path);
  }
}

struct Built {
  path: String,
  outcome: RenderOutcome,
  revalidate: Option<u64>,
  flag: StaticFlag,
  ctx: Arc<RenderContext>,
}

enum Probe {
  Static(Box<Built>),
  Dynamic,
}

#[derive(Clone)]
pub struct Generator {
  composer: Composer,
  dist_dir: PathBuf,
  client_manifest: Arc<ClientManifest>,
  limiter: Limiter,
  retry: RetryPolicy,
  store: Arc<SnapshotStore>,
  manifest: Arc<StatusManifest>,
  regenerating: Arc<Mutex<HashSet<String>>>,
  dynamic: Arc<RwLock<HashSet<String>>>,
}

impl Generator {
  /// Loads `<dist_dir>/status-manifest.json` if present.
  pub fn new(composer: Composer, dist_dir: impl Into<PathBuf>) -> Result<Self> {
    let dist_dir = dist_dir.into();
    let manifest = StatusManifest::load(&dist_dir)?;
    Ok(Self {
      composer,
      dist_dir,
      client_manifest: Arc::new(ClientManifest::default()),
      limiter: Limiter::default(),
      retry: RetryPolicy::default(),
      store: Arc::new(SnapshotStore::new()),
      manifest: Arc::new(manifest),
      regenerating: Arc::new(Mutex::new(HashSet::new())),
      dynamic: Arc::new(RwLock::new(HashSet::new())),
    })
  }

  pub fn limiter(mut self, limiter: Limiter) -> Self {
    self.limiter = limiter;
    self
  }

  pub fn client_manifest(mut self, manifest: Arc<ClientManifest>) -> Self {
    self.client_manifest = manifest;
    self
  }

  pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.retry = policy;
    self
  }

  pub fn composer(&self) -> &Composer {
    &self.composer
  }

  pub fn dist_dir(&self) -> &Path {
    &self.dist_dir
  }

  pub fn store(&self) -> &SnapshotStore {
    &self.store
  }

  pub fn status_manifest(&self) -> &StatusManifest {
    &self.manifest
  }

  pub fn shared_limiter(&self) -> &Limiter {
    &self.limiter
  }

  pub fn shared_client_manifest(&self) -> &Arc<ClientManifest> {
    &self.client_manifest
  }

  pub fn is_dynamic(&self, path: &str) -> bool {
    self.dynamic.read().contains(&normalize_path(path))
  }

  /// Claim the regeneration slot for `path`. Check and insert happen under
  /// one lock, so concurrent callers cannot both win.
  pub fn try_lock(&self, path: &str) -> Option<RegenerationGuard> {
    let path = normalize_path(path);
    if !self.regenerating.lock().insert(path.clone()) {
      return None;
    }
    Some(RegenerationGuard { set: self.regenerating.clone(), path })
  }

  pub fn state_of(&self, path: &str) -> PathState {
    let path = normalize_path(path);
    if self.dynamic.read().contains(&path) {
      return PathState::Dynamic;
    }
    if self.regenerating.lock().contains(&path) {
      return PathState::Regenerating;
    }
    match self.store.get(&path) {
      None => PathState::Missing,
      Some(s) if s.is_stale(now_ms()) => PathState::Stale,
      Some(_) => PathState::Fresh,
    }
  }

  /// Snapshot for `path`, if one may be served. A stale hit is returned
  /// as is and a background rebuild is started when none is running.
  pub fn serve(&self, path: &str) -> Option<ServedSnapshot> {
    let path = normalize_path(path);
    if self.dynamic.read().contains(&path) {
      return None;
    }
    let snapshot = self.store.get(&path)?;
    let stale = snapshot.is_stale(now_ms());
    if stale && let Some(guard) = self.try_lock(&path) {
      self.spawn_regeneration(guard);
    }
    let artifacts = ArtifactPaths::for_route(&self.dist_dir, &path);
    Some(ServedSnapshot { snapshot, artifacts, stale })
  }

  fn spawn_regeneration(&self, guard: RegenerationGuard) {
    let generator = self.clone();
    tokio::spawn(async move {
      let path = guard.path.clone();
      tracing::debug!(path = %path, "background regeneration started");
      if let Err(e) = generator.regenerate_locked(&path, guard).await {
        tracing::error!(path = %path, error = %e, "background regeneration failed");
      }
    });
  }

  /// Rebuild `path` now. Returns `Rebuilt::Skipped` when a rebuild is
  /// already in flight. Failures leave the previous artifacts in place.
  pub async fn regenerate(&self, path: &str) -> Result<Rebuilt> {
    let path = normalize_path(path);
    let Some(guard) = self.try_lock(&path) else {
      return Ok(Rebuilt::Skipped);
    };
    self.regenerate_locked(&path, guard).await
  }

  async fn regenerate_locked(&self, path: &str, guard: RegenerationGuard) -> Result<Rebuilt> {
    let result = self.limiter.run(self.rebuild(path)).await;
    let rebuilt = match result {
      Ok(r) => r,
      Err(e) => return Err(RouterError::regeneration(path, &e)),
    };
    if matches!(rebuilt, Rebuilt::Committed { .. }) {
      self.manifest.persist().await.map_err(|e| RouterError::regeneration(path, &e))?;
    }
    drop(guard);
    Ok(rebuilt)
  }

  /// Startup pass: prerender every static page and every expanded
  /// `getStaticPaths` entry. Individual pages that fail are logged and
  /// skipped; a missing app directory or an unwritable manifest is fatal.
  pub async fn generate_startup(&self) -> Result<GenerationReport> {
    let root = self.composer.root().to_path_buf();
    if !root.is_dir() {
      return Err(RouterError::io(
        format!("app directory {} is missing", root.display()),
        std::io::Error::from(std::io::ErrorKind::NotFound),
      ));
    }

    let mut report = GenerationReport::default();
    let mut candidates: Vec<String> = Vec::new();
    for page in enumerate_pages(&root) {
      match self.candidates_for(&page).await {
        Ok(Some(paths)) => candidates.extend(paths),
        Ok(None) => report.dynamic.push(page.route()),
        Err(e) => {
          tracing::warn!(route = %page.route(), error = %e, "skipping page");
          report.failed.push(FailedPage { path: page.route(), error: e.to_string() });
        }
      }
    }
    candidates.sort();
    candidates.dedup();

    let builds = candidates.iter().map(|path| async move {
      let result = match self.try_lock(path) {
        Some(_guard) => self.limiter.run(self.rebuild(path)).await,
        None => Ok(Rebuilt::Skipped),
      };
      (path, result)
    });
    for (path, result) in join_all(builds).await {
      match result {
        Ok(Rebuilt::Committed { .. }) => report.generated.push(path.clone()),
        Ok(Rebuilt::Dynamic) => report.dynamic.push(path.clone()),
        Ok(Rebuilt::Skipped) => {}
        Err(e) => {
          tracing::warn!(path = %path, error = %e, "static generation failed, serving live");
          report.failed.push(FailedPage { path: path.clone(), error: e.to_string() });
        }
      }
    }

    self.manifest.persist().await?;
    tracing::info!(
      generated = report.generated.len(),
      dynamic = report.dynamic.len(),
      failed = report.failed.len(),
      "static generation finished"
    );
    Ok(report)
  }

  /// Concrete paths to prerender for `page`, or `None` when it is live-only.
  async fn candidates_for(&self, page: &PagePattern) -> Result<Option<Vec<String>>> {
    let exports = self.composer.load_exports(&page.dir).await?;
    let (module, exports) = match exports {
      Some((module, exports)) => (Some(module), exports),
      None => (None, PageExports::default()),
    };
    if exports.force_dynamic() {
      return Ok(None);
    }
    if !page.is_dynamic() {
      return Ok(Some(vec![page.route()]));
    }
    let Some(module) = module.filter(|_| exports.get_static_paths) else {
      return Ok(None);
    };
    let entries = self.composer.runtime().get_static_paths(module).await?;
    let paths = entries
      .iter()
      .filter_map(|entry| {
        let path = expand_static_path(&page.pattern, entry);
        if path.is_none() {
          tracing::debug!(route = %page.route(), ?entry, "static path entry skipped");
        }
        path
      })
      .map(|p| normalize_path(&p))
      .collect();
    Ok(Some(paths))
  }

  async fn exports_for(&self, path: &str) -> Result<PageExports> {
    let Some(route) = locate(&split_path(path), self.composer.root(), FileKind::Page) else {
      return Ok(PageExports::default());
    };
    let loaded = self.composer.load_exports(route.leaf_dir()).await?;
    Ok(loaded.map(|(_, e)| e).unwrap_or_default())
  }

  /// Render `path` against a fresh, empty probe request.
  async fn probe(&self, path: &str) -> Result<Probe> {
    let exports = self.exports_for(path).await?;
    if exports.force_dynamic() {
      return Ok(Probe::Dynamic);
    }
    let flag = StaticFlag::new();
    let req = RequestContext::probe(path, &flag);
    let ctx = Arc::new(RenderContext::new(req, self.client_manifest.clone(), true));
    let outcome = self.composer.render_tree(path, &ctx).await?;
    if !flag.is_static() {
      return Ok(Probe::Dynamic);
    }
    if outcome.kind == RenderKind::Error {
      return Err(RouterError::PageRender {
        path: path.to_string(),
        message: "rendered the error component".to_string(),
      });
    }
    if let Some(redirect) = &outcome.effects.redirect {
      tracing::warn!(path, url = %redirect.url, "redirect during static build, keeping it as snapshot metadata");
    }
    let built = Built { path: path.to_string(), outcome, revalidate: exports.revalidate, flag, ctx };
    Ok(Probe::Static(Box::new(built)))
  }

  /// Probe, write, commit. The previous artifacts stay untouched unless
  /// both new ones were written and renamed.
  async fn rebuild(&self, path: &str) -> Result<Rebuilt> {
    let built = match self.probe(path).await? {
      Probe::Static(built) => built,
      Probe::Dynamic => {
        self.mark_dynamic(path);
        return Ok(Rebuilt::Dynamic);
      }
    };
    let Built { path, mut outcome, revalidate, flag, ctx } = *built;
    let artifacts = ArtifactPaths::for_route(&self.dist_dir, &path);

    let written: Result<()> = async {
      let rsc = serde_json::to_string(&outcome.tree)?;
      artifacts.write_rsc_temp(&rsc).await?;
      self.composer.render_html(&mut outcome, &ctx).await?;
      artifacts.write_html_temp(&outcome.html).await
    }
    .await;
    if let Err(e) = written {
      artifacts.discard_temp().await;
      return Err(e);
    }
    if !flag.is_static() {
      artifacts.discard_temp().await;
      self.mark_dynamic(&path);
      return Ok(Rebuilt::Dynamic);
    }
    artifacts.commit(self.retry).await?;

    let effects = outcome.effects;
    self.store.insert(StaticSnapshot {
      path: path.clone(),
      tree: outcome.tree,
      revalidate_seconds: revalidate,
      generated_at_ms: now_ms(),
      status: outcome.status,
      side_effects: SideEffects {
        redirect_url: effects.redirect.map(|r| r.url),
        cookies: effects.cookies,
      },
    });
    self.manifest.set(&path, outcome.status);
    tracing::debug!(path = %path, status = outcome.status, "snapshot committed");
    Ok(Rebuilt::Committed { status: outcome.status })
  }

  fn mark_dynamic(&self, path: &str) {
    tracing::info!(path, "page reads request data, serving it live");
    self.store.remove(path);
    self.dynamic.write().insert(path.to_string());
  }
}

#[cfg(test)]
mod tests;
