/* src/cli/core/src/config/types.rs */

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TrellisConfig {
  pub project: ProjectConfig,
  #[serde(default)]
  pub app: AppSection,
  #[serde(default)]
  pub render: RenderSection,
  #[serde(default)]
  pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  #[serde(default = "default_app_dir")]
  pub dir: String,
  #[serde(default = "default_dist_dir")]
  pub dist_dir: String,
  #[serde(default = "default_public_dir")]
  pub public_dir: String,
}

impl Default for AppSection {
  fn default() -> Self {
    Self { dir: default_app_dir(), dist_dir: default_dist_dir(), public_dir: default_public_dir() }
  }
}

fn default_app_dir() -> String {
  "app".to_string()
}

fn default_dist_dir() -> String {
  "dist2".to_string()
}

fn default_public_dir() -> String {
  "public".to_string()
}

/// How server components are executed. `command` is run through `sh -c`
/// once per runtime call and speaks JSON over stdin/stdout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderSection {
  pub command: Option<String>,
  /// Render slots; defaults to twice the available parallelism.
  pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for ServerSection {
  fn default() -> Self {
    Self { port: default_port() }
  }
}

fn default_port() -> u16 {
  3000
}

impl TrellisConfig {
  pub fn app_dir(&self, base_dir: &Path) -> PathBuf {
    base_dir.join(&self.app.dir)
  }

  pub fn dist_dir(&self, base_dir: &Path) -> PathBuf {
    base_dir.join(&self.app.dist_dir)
  }

  pub fn public_dir(&self, base_dir: &Path) -> PathBuf {
    base_dir.join(&self.app.public_dir)
  }

  pub fn validate(&self, base_dir: &Path) -> Result<()> {
    if self.render.concurrency == Some(0) {
      bail!("render.concurrency must be greater than 0");
    }
    let app_dir = self.app_dir(base_dir);
    if !app_dir.is_dir() {
      bail!("app.dir \"{}\" does not exist ({})", self.app.dir, app_dir.display());
    }
    Ok(())
  }
}
