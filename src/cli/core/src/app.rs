/* src/cli/core/src/app.rs */

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use trellis_server::{ProcessRuntime, TrellisApp};

use crate::config::TrellisConfig;

/// Wire the configured render command and directories into a `TrellisApp`.
/// The render command runs with the project root as its working directory.
pub fn trellis_app(config: &TrellisConfig, base_dir: &Path) -> Result<TrellisApp> {
  let command = config
    .render
    .command
    .as_deref()
    .context("render.command is required to build or serve (set it in trellis.toml)")?;
  let runtime = ProcessRuntime::new(command).current_dir(base_dir);

  let mut app = TrellisApp::new(config.app_dir(base_dir), Arc::new(runtime))
    .dist_dir(config.dist_dir(base_dir))
    .public_dir(config.public_dir(base_dir));
  if let Some(n) = config.render.concurrency {
    app = app.concurrency(n);
  }
  Ok(app)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(toml_str: &str) -> TrellisConfig {
    toml::from_str(toml_str).unwrap()
  }

  #[test]
  fn render_command_is_required() {
    let cfg = config("[project]\nname = \"x\"\n");
    let err = trellis_app(&cfg, Path::new(".")).err().unwrap();
    assert!(err.to_string().contains("render.command"));
  }

  #[test]
  fn configured_concurrency_reaches_the_limiter() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("app")).unwrap();
    let cfg = config("[project]\nname = \"x\"\n\n[render]\ncommand = \"true\"\nconcurrency = 3\n");
    let parts = trellis_app(&cfg, tmp.path()).unwrap().into_parts().unwrap();
    assert_eq!(parts.limiter.size(), 3);
    assert!(parts.public_dir.is_none());
  }
}
