/* src/cli/core/src/config/loader.rs */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::TrellisConfig;

/// Walk upward from `start` to find `trellis.toml`, like Cargo.toml discovery
pub fn find_trellis_config(start: &Path) -> Result<PathBuf> {
  let mut dir =
    start.canonicalize().with_context(|| format!("failed to canonicalize {}", start.display()))?;
  loop {
    let candidate = dir.join("trellis.toml");
    if candidate.is_file() {
      return Ok(candidate);
    }
    if !dir.pop() {
      bail!("trellis.toml not found (searched upward from {})", start.display());
    }
  }
}

/// Parse and validate; relative directories resolve against the file's parent.
pub fn load_trellis_config(path: &Path) -> Result<TrellisConfig> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let config: TrellisConfig =
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
  let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
  config.validate(base_dir).with_context(|| format!("invalid {}", path.display()))?;
  Ok(config)
}
