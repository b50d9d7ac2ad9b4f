/* src/server/core/rust/src/render.rs */

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{RequestContext, ResponseContext};
use crate::errors::{Result, RouterError};
use crate::matcher::Params;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Unrendered component tree handed to the module runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
  Component {
    module: PathBuf,
    #[serde(default)]
    props: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Box<Element>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
  },
  /// Output the runtime already produced (rendered slots).
  Serialized { value: serde_json::Value },
  Null,
}

impl Element {
  pub fn component(module: impl Into<PathBuf>, props: serde_json::Map<String, serde_json::Value>) -> Self {
    Self::Component { module: module.into(), props, children: None, key: None }
  }

  pub fn with_children(self, child: Element) -> Self {
    match self {
      Self::Component { module, props, key, .. } => {
        Self::Component { module, props, children: Some(Box::new(child)), key }
      }
      other => other,
    }
  }

  pub fn with_key(self, key: impl Into<String>) -> Self {
    match self {
      Self::Component { module, props, children, .. } => {
        Self::Component { module, props, children, key: Some(key.into()) }
      }
      other => other,
    }
  }
}

/// `page_functions` exports the router cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageExports {
  #[serde(default)]
  pub get_props: bool,
  #[serde(default)]
  pub get_static_paths: bool,
  /// `"force-dynamic"` opts the page out of static generation.
  #[serde(default)]
  pub dynamic: Option<String>,
  /// Seconds until a static snapshot goes stale. `None`: never.
  #[serde(default)]
  pub revalidate: Option<u64>,
}

impl PageExports {
  pub fn force_dynamic(&self) -> bool {
    self.dynamic.as_deref() == Some("force-dynamic")
  }
}

/// One `getStaticPaths` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticPathParams {
  /// Ready-made URL segments.
  Segments(Vec<String>),
  /// Param name -> string / string array / null.
  Params(serde_json::Map<String, serde_json::Value>),
}

/// Client reference -> asset URL map produced by the bundler. Passed
/// through the render context instead of living in a global registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientManifest(pub HashMap<String, String>);

impl ClientManifest {
  pub fn asset_url(&self, reference: &str) -> Option<&str> {
    self.0.get(reference).map(String::as_str)
  }
}

/// Everything one render pass can see.
#[derive(Debug)]
pub struct RenderContext {
  pub req: RequestContext,
  pub res: ResponseContext,
  pub client_manifest: Arc<ClientManifest>,
  /// True during a static build pass.
  pub build: bool,
}

impl RenderContext {
  pub fn new(req: RequestContext, client_manifest: Arc<ClientManifest>, build: bool) -> Self {
    Self { req, res: ResponseContext::new(), client_manifest, build }
  }
}

/// The component engine. Everything JSX-related lives behind this trait:
/// module evaluation, data hooks and serialisation.
pub trait ModuleRuntime: Send + Sync {
  fn page_exports(&self, module: PathBuf) -> BoxFuture<Result<PageExports>>;

  /// `getProps(params, query, cookies)`; query and cookies come from `ctx.req`.
  fn get_props(
    &self,
    module: PathBuf,
    params: Params,
    ctx: Arc<RenderContext>,
  ) -> BoxFuture<Result<serde_json::Value>>;

  fn get_static_paths(&self, module: PathBuf) -> BoxFuture<Result<Vec<StaticPathParams>>>;

  /// Render an element tree into its serialisable (RSC) form.
  fn render_tree(
    &self,
    element: Element,
    ctx: Arc<RenderContext>,
  ) -> BoxFuture<Result<serde_json::Value>>;

  /// Render a serialised tree into an HTML document.
  fn render_html(
    &self,
    tree: serde_json::Value,
    ctx: Arc<RenderContext>,
  ) -> BoxFuture<Result<String>>;
}

/// Load `<dist>/client-manifest.json`; absent or unreadable yields `None`.
pub fn load_client_manifest(dist_dir: &Path) -> Option<ClientManifest> {
  let content = std::fs::read_to_string(dist_dir.join("client-manifest.json")).ok()?;
  serde_json::from_str(&content).ok()
}

/// Message a runtime error should carry into error components.
pub(crate) fn error_props(err: &RouterError) -> serde_json::Value {
  serde_json::json!({ "message": err.to_string() })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn element_serializes_with_type_tag() {
    let el = Element::component("/app/page.tsx", serde_json::Map::new()).with_key("k");
    let json = serde_json::to_value(&el).unwrap();
    assert_eq!(json["type"], "component");
    assert_eq!(json["key"], "k");
    assert!(json.get("children").is_none());
  }

  #[test]
  fn static_path_params_accept_both_shapes() {
    let list: Vec<StaticPathParams> =
      serde_json::from_value(serde_json::json!([["a", "b"], {"slug": "c"}])).unwrap();
    assert!(matches!(list[0], StaticPathParams::Segments(ref s) if s.len() == 2));
    assert!(matches!(list[1], StaticPathParams::Params(_)));
  }

  #[test]
  fn page_exports_parse_camel_case() {
    let exports: PageExports = serde_json::from_value(serde_json::json!({
      "getProps": true,
      "dynamic": "force-dynamic",
      "revalidate": 60
    }))
    .unwrap();
    assert!(exports.get_props);
    assert!(exports.force_dynamic());
    assert_eq!(exports.revalidate, Some(60));
  }

  #[test]
  fn client_manifest_loads_from_dist() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("client-manifest.json"), r#"{"Button#default": "/assets/b.js"}"#)
      .unwrap();
    let manifest = load_client_manifest(dir.path()).unwrap();
    assert_eq!(manifest.asset_url("Button#default"), Some("/assets/b.js"));
    assert!(load_client_manifest(&dir.path().join("missing")).is_none());
  }
}
