/* src/server/core/rust/src/testing.rs */

// Test fixtures: on-disk app trees and a scripted in-process runtime.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::context::RequestContext;
use crate::errors::{Result, RouterError};
use crate::matcher::Params;
use crate::render::{
  BoxFuture, ClientManifest, Element, ModuleRuntime, PageExports, RenderContext, StaticPathParams,
};

pub(crate) fn segs(parts: &[&str]) -> Vec<String> {
  parts.iter().map(|s| (*s).to_string()).collect()
}

/// Temp app directory with an empty file at every listed relative path.
pub(crate) fn app_tree(files: &[&str]) -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  for file in files {
    let path = dir.path().join(file);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "").unwrap();
  }
  dir
}

pub(crate) fn live_ctx(path: &str) -> Arc<RenderContext> {
  let req = RequestContext::live("GET", path, BTreeMap::new(), BTreeMap::new(), BTreeMap::new());
  Arc::new(RenderContext::new(req, Arc::new(ClientManifest::default()), false))
}

#[derive(Default)]
struct Script {
  exports: HashMap<String, PageExports>,
  props: HashMap<String, Value>,
  static_paths: HashMap<String, Vec<StaticPathParams>>,
  failing: HashSet<String>,
  reads_cookies: HashSet<String>,
  redirects: HashMap<String, String>,
  fail_html: bool,
  delay: Option<Duration>,
}

/// Runtime whose modules are identified by their path relative to the app
/// root. Rendering a component yields `{"module": rel, "props": .., "children": ..}`.
pub(crate) struct StubRuntime {
  root: PathBuf,
  script: Mutex<Script>,
  pub html_renders: AtomicUsize,
  pub tree_renders: AtomicUsize,
}

impl StubRuntime {
  pub(crate) fn new(root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
      script: Mutex::new(Script::default()),
      html_renders: AtomicUsize::new(0),
      tree_renders: AtomicUsize::new(0),
    }
  }

  fn rel(&self, module: &Path) -> String {
    module.strip_prefix(&self.root).unwrap_or(module).to_string_lossy().replace('\\', "/")
  }

  pub(crate) fn exports(self, rel: &str, exports: PageExports) -> Self {
    self.script.lock().exports.insert(rel.to_string(), exports);
    self
  }

  pub(crate) fn props(self, rel: &str, value: Value) -> Self {
    self.set_props(rel, value);
    self
  }

  pub(crate) fn set_props(&self, rel: &str, value: Value) {
    self.script.lock().props.insert(rel.to_string(), value);
  }

  pub(crate) fn static_paths(self, rel: &str, paths: Vec<StaticPathParams>) -> Self {
    self.script.lock().static_paths.insert(rel.to_string(), paths);
    self
  }

  pub(crate) fn failing(self, rel: &str) -> Self {
    self.set_failing(rel, true);
    self
  }

  pub(crate) fn set_failing(&self, rel: &str, failing: bool) {
    let mut script = self.script.lock();
    if failing {
      script.failing.insert(rel.to_string());
    } else {
      script.failing.remove(rel);
    }
  }

  pub(crate) fn reads_cookies(self, rel: &str) -> Self {
    self.set_reads_cookies(rel);
    self
  }

  pub(crate) fn set_reads_cookies(&self, rel: &str) {
    self.script.lock().reads_cookies.insert(rel.to_string());
  }

  pub(crate) fn redirects(self, rel: &str, url: &str) -> Self {
    self.script.lock().redirects.insert(rel.to_string(), url.to_string());
    self
  }

  pub(crate) fn set_fail_html(&self, fail: bool) {
    self.script.lock().fail_html = fail;
  }

  pub(crate) fn delay(self, delay: Duration) -> Self {
    self.script.lock().delay = Some(delay);
    self
  }

  fn render_element(&self, element: &Element, ctx: &RenderContext) -> Result<Value> {
    match element {
      Element::Null => Ok(Value::Null),
      Element::Serialized { value } => Ok(value.clone()),
      Element::Component { module, props, children, key } => {
        let rel = self.rel(module);
        let (fails, reads, redirect) = {
          let script = self.script.lock();
          (
            script.failing.contains(&rel),
            script.reads_cookies.contains(&rel),
            script.redirects.get(&rel).cloned(),
          )
        };
        if reads {
          let _ = ctx.req.cookies.get("foo");
        }
        if let Some(url) = redirect {
          ctx.res.redirect(url);
        }
        if fails {
          return Err(RouterError::runtime(format!("{rel} threw")));
        }
        let children = match children {
          Some(child) => self.render_element(child, ctx)?,
          None => Value::Null,
        };
        Ok(json!({ "module": rel, "props": props, "children": children, "key": key }))
      }
    }
  }

  fn pause(&self) -> Option<Duration> {
    self.script.lock().delay
  }
}

fn ready<T: Send + 'static>(delay: Option<Duration>, value: T) -> BoxFuture<T> {
  Box::pin(async move {
    if let Some(d) = delay {
      tokio::time::sleep(d).await;
    }
    value
  })
}

impl ModuleRuntime for StubRuntime {
  fn page_exports(&self, module: PathBuf) -> BoxFuture<Result<PageExports>> {
    let exports = self.script.lock().exports.get(&self.rel(&module)).cloned().unwrap_or_default();
    ready(None, Ok(exports))
  }

  fn get_props(
    &self,
    module: PathBuf,
    params: Params,
    _ctx: Arc<RenderContext>,
  ) -> BoxFuture<Result<Value>> {
    let rel = self.rel(&module);
    let script = self.script.lock();
    let result = if script.failing.contains(&rel) {
      Err(RouterError::runtime(format!("{rel} getProps threw")))
    } else {
      let mut value = script.props.get(&rel).cloned().unwrap_or_else(|| json!({}));
      if let Some(obj) = value.as_object_mut()
        && obj.get("echoParams") == Some(&Value::Bool(true))
      {
        obj.insert("echoParams".to_string(), serde_json::to_value(&params).unwrap_or(Value::Null));
      }
      Ok(value)
    };
    ready(None, result)
  }

  fn get_static_paths(&self, module: PathBuf) -> BoxFuture<Result<Vec<StaticPathParams>>> {
    let paths = self.script.lock().static_paths.get(&self.rel(&module)).cloned().unwrap_or_default();
    ready(None, Ok(paths))
  }

  fn render_tree(&self, element: Element, ctx: Arc<RenderContext>) -> BoxFuture<Result<Value>> {
    self.tree_renders.fetch_add(1, Ordering::SeqCst);
    let result = self.render_element(&element, &ctx);
    ready(self.pause(), result)
  }

  fn render_html(&self, tree: Value, _ctx: Arc<RenderContext>) -> BoxFuture<Result<String>> {
    self.html_renders.fetch_add(1, Ordering::SeqCst);
    let result = if self.script.lock().fail_html {
      Err(RouterError::runtime("html render threw"))
    } else {
      Ok(format!("<html>{tree}</html>"))
    };
    ready(None, result)
  }
}
