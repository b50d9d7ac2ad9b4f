/* src/cli/core/src/build.rs */

use std::path::Path;

use anyhow::{Context, Result, bail};
use trellis_server::GenerationReport;

use crate::app::trellis_app;
use crate::config::TrellisConfig;
use crate::ui::{self, DIM, RESET};

/// Startup static generation as a standalone step. Pages that fail are
/// reported and skipped; only a fatal error (unreadable app dir, status
/// manifest not persisted) aborts.
pub async fn run_build(config: &TrellisConfig, base_dir: &Path) -> Result<()> {
  ui::banner("build");
  let app = trellis_app(config, base_dir)?;
  let parts = app.into_parts().context("failed to prepare generator")?;
  ui::arrow(&format!("generating {} -> {}", config.app.dir, config.app.dist_dir));

  let report =
    parts.generator.generate_startup().await.context("static generation aborted")?;
  print_report(&report, &config.app.dist_dir);

  if report.generated.is_empty() && !report.failed.is_empty() {
    bail!("no page could be generated");
  }
  Ok(())
}

fn print_report(report: &GenerationReport, dist_dir: &str) {
  for path in &report.generated {
    ui::detail_ok(&format!("{path}  {DIM}({dist_dir}){RESET}"));
  }
  for path in &report.dynamic {
    ui::detail(&format!("{path}  {DIM}(dynamic){RESET}"));
  }
  for failed in &report.failed {
    ui::fail(&format!("{}: {}", failed.path, failed.error));
  }
  ui::blank();
  ui::ok(&format!(
    "{} generated, {} dynamic, {} failed",
    report.generated.len(),
    report.dynamic.len(),
    report.failed.len()
  ));
  if !report.failed.is_empty() {
    ui::warn("failed pages are not persisted and will render per request");
  }
}
