/* src/cli/core/src/routes.rs */

// `trellis routes`: show how a URL resolves against the app tree without
// running any component code.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use trellis_server::{
  FileKind, enumerate_pages, layout_chain, locate, locate_fallback, normalize_path, split_path,
};

use crate::ui;

fn rel(path: &Path, root: &Path) -> String {
  path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Resolution of `path`: page module, params, layout chain with slots, and
/// the `not_found` / `error` files that would handle it.
pub fn inspect_route(app_dir: &Path, path: &str) -> Value {
  let segments = split_path(path);
  let page = locate(&segments, app_dir, FileKind::Page);
  let fallback = |kind| {
    locate_fallback(&segments, app_dir, kind).map(|m| rel(&m.module_path, app_dir))
  };

  let layouts: Vec<Value> = page
    .as_ref()
    .map(|route| {
      layout_chain(route, &segments)
        .into_iter()
        .map(|entry| {
          let slots: serde_json::Map<String, Value> = entry
            .slots
            .iter()
            .map(|(name, slot)| {
              let page = slot.page.as_ref().map(|m| rel(&m.module_path, app_dir));
              (name.clone(), json!(page))
            })
            .collect();
          json!({
            "dir": rel(&entry.dir, app_dir),
            "module": entry.module.as_deref().map(|m| rel(m, app_dir)),
            "reset": entry.reset,
            "slots": slots,
          })
        })
        .collect()
    })
    .unwrap_or_default();

  json!({
    "path": normalize_path(path),
    "page": page.as_ref().map(|m| rel(&m.module_path, app_dir)),
    "params": page.as_ref().map(|m| json!(m.params)),
    "layouts": layouts,
    "not_found": fallback(FileKind::NotFound),
    "error": fallback(FileKind::Error),
  })
}

/// Every URL-reachable page pattern, in directory syntax.
pub fn list_routes(app_dir: &Path) -> Vec<Value> {
  enumerate_pages(app_dir)
    .into_iter()
    .map(|p| {
      json!({
        "route": p.route(),
        "module": rel(&p.module_path, app_dir),
        "dynamic": p.is_dynamic(),
      })
    })
    .collect()
}

pub fn run_routes(app_dir: &Path, path: Option<&str>) -> Result<()> {
  let value = match path {
    Some(path) => inspect_route(app_dir, path),
    None => {
      let routes = list_routes(app_dir);
      ui::arrow(&format!("{} routes under {}", routes.len(), app_dir.display()));
      Value::Array(routes)
    }
  };
  let out = serde_json::to_string_pretty(&value).context("failed to serialize routes")?;
  println!("{out}");
  Ok(())
}
