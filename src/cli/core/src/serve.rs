/* src/cli/core/src/serve.rs */

use std::path::Path;

use anyhow::{Result, anyhow};
use trellis_server_axum::IntoAxumRouter;

use crate::app::trellis_app;
use crate::config::TrellisConfig;
use crate::ui;

pub async fn run_serve(config: &TrellisConfig, base_dir: &Path, port: u16) -> Result<()> {
  ui::banner("serve");
  let app = trellis_app(config, base_dir)?;
  ui::arrow(&format!("project {} on port {port}", config.project.name));
  let addr = format!("0.0.0.0:{port}");
  app.serve(&addr).await.map_err(|e| anyhow!("server stopped: {e}"))
}
