/* src/server/core/rust/src/server.rs */

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::RetryPolicy;
use crate::compose::Composer;
use crate::errors::Result;
use crate::lifecycle::Generator;
use crate::limiter::Limiter;
use crate::render::{ClientManifest, ModuleRuntime, load_client_manifest};

/// Framework-agnostic parts extracted from `TrellisApp`.
/// Adapter crates consume this to build framework-specific routers.
pub struct TrellisParts {
  pub composer: Composer,
  pub generator: Generator,
  pub limiter: Limiter,
  pub client_manifest: Arc<ClientManifest>,
  pub public_dir: Option<PathBuf>,
}

pub struct TrellisApp {
  app_dir: PathBuf,
  dist_dir: PathBuf,
  public_dir: Option<PathBuf>,
  runtime: Arc<dyn ModuleRuntime>,
  concurrency: Option<usize>,
  retry: RetryPolicy,
}

impl TrellisApp {
  /// `app_dir` holds the route tree; artifacts default to `dist2`.
  pub fn new(app_dir: impl Into<PathBuf>, runtime: Arc<dyn ModuleRuntime>) -> Self {
    Self {
      app_dir: app_dir.into(),
      dist_dir: PathBuf::from("dist2"),
      public_dir: None,
      runtime,
      concurrency: None,
      retry: RetryPolicy::default(),
    }
  }

  pub fn dist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.dist_dir = dir.into();
    self
  }

  pub fn public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.public_dir = Some(dir.into());
    self
  }

  /// Render slots shared by live SSR and static generation.
  pub fn concurrency(mut self, n: usize) -> Self {
    self.concurrency = Some(n);
    self
  }

  pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.retry = policy;
    self
  }

  /// Consume the builder. Reads the client manifest and status manifest
  /// from the dist directory when they exist.
  pub fn into_parts(self) -> Result<TrellisParts> {
    let limiter = self.concurrency.map_or_else(Limiter::default, Limiter::new);
    let client_manifest = Arc::new(load_client_manifest(&self.dist_dir).unwrap_or_default());
    let composer = Composer::new(self.app_dir, self.runtime);
    let generator = Generator::new(composer.clone(), &self.dist_dir)?
      .limiter(limiter.clone())
      .client_manifest(client_manifest.clone())
      .retry_policy(self.retry);
    let public_dir = self.public_dir.filter(|d| d.is_dir());
    Ok(TrellisParts { composer, generator, limiter, client_manifest, public_dir })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::StubRuntime;

  #[test]
  fn parts_share_one_limiter_and_load_manifests() {
    let app = tempfile::tempdir().unwrap();
    let dist = tempfile::tempdir().unwrap();
    std::fs::write(dist.path().join("client-manifest.json"), r#"{"Button": "/assets/button.js"}"#)
      .unwrap();
    std::fs::write(dist.path().join("status-manifest.json"), r#"{"/": 200}"#).unwrap();

    let parts = TrellisApp::new(app.path(), Arc::new(StubRuntime::new(app.path())))
      .dist_dir(dist.path())
      .public_dir(app.path().join("missing-public"))
      .concurrency(3)
      .into_parts()
      .unwrap();
    assert_eq!(parts.limiter.size(), 3);
    assert_eq!(parts.generator.shared_limiter().size(), 3);
    assert_eq!(parts.client_manifest.asset_url("Button"), Some("/assets/button.js"));
    assert_eq!(parts.generator.status_manifest().get("/"), Some(200));
    assert!(parts.public_dir.is_none());
  }
}
