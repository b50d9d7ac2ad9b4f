/* src/server/core/rust/src/compose.rs */

// Render composer: getProps, slot rendering with per-slot failure
// isolation, and layout wrapping from innermost to outermost.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use crate::context::ResponseEffects;
use crate::errors::{Result, RouterError};
use crate::locator::{LayoutEntry, ResolvedRoute, SlotEntry, has_marker, layout_chain, locate, locate_fallback};
use crate::matcher::{FileKind, Params, find_file, split_path};
use crate::render::{Element, ModuleRuntime, PageExports, RenderContext, error_props};

/// Which surface a render produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
  Page,
  NotFound,
  Error,
}

impl RenderKind {
  fn default_status(self) -> u16 {
    match self {
      Self::Page => 200,
      Self::NotFound => 404,
      Self::Error => 500,
    }
  }

  fn no_layout_marker(self) -> FileKind {
    match self {
      Self::Page => FileKind::NoLayout,
      Self::NotFound => FileKind::NoLayoutNotFound,
      Self::Error => FileKind::NoLayoutError,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
  pub kind: RenderKind,
  pub status: u16,
  /// Serialised component tree (the RSC payload).
  pub tree: Value,
  /// Empty until the HTML pass ran.
  pub html: String,
  pub effects: ResponseEffects,
}

/// getProps result split into its scopes.
#[derive(Debug, Default, PartialEq)]
pub struct PropBags {
  pub page: Map<String, Value>,
  pub layout: Map<String, Value>,
  pub not_found: bool,
}

impl PropBags {
  /// `{page, layout}` is split; an object with neither key is all page
  /// props; `{"notFound": true}` turns the render into a 404.
  pub fn split(value: Value) -> Self {
    let Value::Object(mut obj) = value else {
      return Self::default();
    };
    if obj.get("notFound") == Some(&Value::Bool(true)) {
      return Self { not_found: true, ..Self::default() };
    }
    if !obj.contains_key("page") && !obj.contains_key("layout") {
      return Self { page: obj, ..Self::default() };
    }
    let take = |v: Option<Value>| match v {
      Some(Value::Object(m)) => m,
      _ => Map::new(),
    };
    Self { page: take(obj.remove("page")), layout: take(obj.remove("layout")), not_found: false }
  }
}

fn params_value(params: &Params) -> Value {
  serde_json::to_value(params).unwrap_or(Value::Null)
}

fn base_props(params: &Params) -> Map<String, Value> {
  let mut props = Map::new();
  props.insert("params".to_string(), params_value(params));
  props
}

#[derive(Clone)]
pub struct Composer {
  root: PathBuf,
  runtime: Arc<dyn ModuleRuntime>,
}

impl Composer {
  pub fn new(root: impl Into<PathBuf>, runtime: Arc<dyn ModuleRuntime>) -> Self {
    Self { root: root.into(), runtime }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn runtime(&self) -> &Arc<dyn ModuleRuntime> {
    &self.runtime
  }

  /// `page_functions` module in `dir` and its exports, if present.
  pub async fn load_exports(&self, dir: &Path) -> Result<Option<(PathBuf, PageExports)>> {
    let Some(module) = find_file(dir, FileKind::PageFunctions.stem(), true) else {
      return Ok(None);
    };
    let exports = self.runtime.page_exports(module.clone()).await?;
    Ok(Some((module, exports)))
  }

  async fn load_props(&self, route: &ResolvedRoute, ctx: &Arc<RenderContext>) -> Result<PropBags> {
    let Some((module, exports)) = self.load_exports(route.leaf_dir()).await? else {
      return Ok(PropBags::default());
    };
    if !exports.get_props {
      return Ok(PropBags::default());
    }
    let value = self.runtime.get_props(module, route.params.clone(), ctx.clone()).await?;
    Ok(PropBags::split(value))
  }

  /// Build the wrapped element for a matched page. `None` when getProps
  /// asked for a 404.
  pub async fn compose(
    &self,
    route: &ResolvedRoute,
    segments: &[String],
    ctx: &Arc<RenderContext>,
  ) -> Result<Option<Element>> {
    let bags = self.load_props(route, ctx).await?;
    if bags.not_found {
      return Ok(None);
    }
    let mut props = base_props(&route.params);
    props.extend(bags.page);
    let page = Element::component(route.module_path.clone(), props);
    Ok(Some(self.wrap(page, route, segments, ctx, RenderKind::Page, bags.layout).await))
  }

  async fn wrap(
    &self,
    element: Element,
    route: &ResolvedRoute,
    segments: &[String],
    ctx: &Arc<RenderContext>,
    kind: RenderKind,
    layout_bag: Map<String, Value>,
  ) -> Element {
    if has_marker(route.leaf_dir(), kind.no_layout_marker()) {
      return element;
    }
    let chain = layout_chain(route, segments);
    // Nothing outside the innermost reset boundary applies.
    let start = chain.iter().rposition(|e| e.reset).unwrap_or(0);
    let applied = &chain[start..];
    let effective_root = applied.iter().position(|e| e.module.is_some());

    let mut layout_bag = Some(layout_bag);
    let mut element = element;
    for (i, entry) in applied.iter().enumerate().rev() {
      let Some(module) = &entry.module else {
        continue;
      };
      let mut props = base_props(&entry.params);
      if Some(i) == effective_root
        && let Some(bag) = layout_bag.take()
      {
        props.extend(bag);
      }
      for (name, content) in self.render_slots(entry, ctx).await {
        props.insert(name, content);
      }
      element = Element::component(module.clone(), props).with_children(element);
    }
    element
  }

  async fn render_slots(&self, entry: &LayoutEntry, ctx: &Arc<RenderContext>) -> Vec<(String, Value)> {
    let renders = entry.slots.iter().map(|(name, slot)| async move {
      let content = self.render_slot(name, slot, ctx).await;
      (name.clone(), content)
    });
    join_all(renders).await
  }

  /// Render one slot. Failures never propagate: the slot's own `error`
  /// component takes over, or the slot renders as `null`.
  async fn render_slot(&self, name: &str, slot: &SlotEntry, ctx: &Arc<RenderContext>) -> Value {
    let Some(page) = &slot.page else {
      return Value::Null;
    };
    let element = Element::component(page.module_path.clone(), base_props(&page.params));
    let err = match self.runtime.render_tree(element, ctx.clone()).await {
      Ok(value) => return value,
      Err(err) => RouterError::SlotRender { slot: name.to_string(), message: err.to_string() },
    };

    let Some(error_module) = find_slot_error(page.leaf_dir(), &slot.dir) else {
      tracing::warn!(slot = name, error = %err, "slot has no error component, rendering null");
      return Value::Null;
    };
    tracing::warn!(slot = name, error = %err, "slot failed, rendering its error component");
    let mut props = base_props(&page.params);
    props.insert("error".to_string(), error_props(&err));
    let fallback = Element::component(error_module, props).with_key(format!("@{name}:error"));
    match self.runtime.render_tree(fallback, ctx.clone()).await {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(slot = name, error = %e, "slot error component failed, rendering null");
        Value::Null
      }
    }
  }

  async fn finish(
    &self,
    kind: RenderKind,
    element: Element,
    ctx: &Arc<RenderContext>,
  ) -> Result<RenderOutcome> {
    let tree = self.runtime.render_tree(element, ctx.clone()).await?;
    let effects = ctx.res.snapshot();
    let status = effects.status.unwrap_or_else(|| kind.default_status());
    Ok(RenderOutcome { kind, status, tree, html: String::new(), effects })
  }

  async fn render_page(
    &self,
    route: &ResolvedRoute,
    segments: &[String],
    ctx: &Arc<RenderContext>,
  ) -> Result<Option<RenderOutcome>> {
    let Some(element) = self.compose(route, segments, ctx).await? else {
      return Ok(None);
    };
    self.finish(RenderKind::Page, element, ctx).await.map(Some)
  }

  /// Nearest `not_found` component for `segments`, wrapped in its layouts.
  pub async fn render_not_found(
    &self,
    segments: &[String],
    ctx: &Arc<RenderContext>,
  ) -> Result<RenderOutcome> {
    let path = format!("/{}", segments.join("/"));
    let Some(route) = locate_fallback(segments, &self.root, FileKind::NotFound) else {
      return Err(RouterError::NotFound { path });
    };
    let element = Element::component(route.module_path.clone(), base_props(&route.params));
    let element = self.wrap(element, &route, segments, ctx, RenderKind::NotFound, Map::new()).await;
    self.finish(RenderKind::NotFound, element, ctx).await
  }

  /// Nearest `error` component for `segments`, rendered with `cause`.
  pub async fn render_error(
    &self,
    segments: &[String],
    cause: &RouterError,
    ctx: &Arc<RenderContext>,
  ) -> Result<RenderOutcome> {
    let path = format!("/{}", segments.join("/"));
    let Some(route) = locate_fallback(segments, &self.root, FileKind::Error) else {
      return Err(RouterError::page_render(path, cause));
    };
    ctx.res.reset_outcome();
    let mut props = base_props(&route.params);
    props.insert("error".to_string(), error_props(cause));
    let element = Element::component(route.module_path.clone(), props);
    let element = self.wrap(element, &route, segments, ctx, RenderKind::Error, Map::new()).await;
    self
      .finish(RenderKind::Error, element, ctx)
      .await
      .map_err(|e| RouterError::page_render(path, &e))
  }

  /// Component tree for `path`: page, then not-found, then error
  /// fallbacks. Errors only when no fallback component exists (or it
  /// failed too).
  pub async fn render_tree(&self, path: &str, ctx: &Arc<RenderContext>) -> Result<RenderOutcome> {
    let segments = split_path(path);
    let attempt = match locate(&segments, &self.root, FileKind::Page) {
      Some(route) => self.render_page(&route, &segments, ctx).await,
      None => Ok(None),
    };
    match attempt {
      Ok(Some(outcome)) => Ok(outcome),
      Ok(None) | Err(RouterError::NotFound { .. }) => self.render_not_found(&segments, ctx).await,
      Err(err) => {
        tracing::error!(path, error = %err, "page render failed");
        self.render_error(&segments, &err, ctx).await
      }
    }
  }

  /// Fill in `outcome.html`.
  pub async fn render_html(&self, outcome: &mut RenderOutcome, ctx: &Arc<RenderContext>) -> Result<()> {
    outcome.html = self.runtime.render_html(outcome.tree.clone(), ctx.clone()).await?;
    Ok(())
  }

  /// Tree and HTML for a request. An HTML failure on a page or not-found
  /// render falls back to the error component.
  pub async fn render(&self, path: &str, ctx: &Arc<RenderContext>) -> Result<RenderOutcome> {
    let mut outcome = self.render_tree(path, ctx).await?;
    let err = match self.render_html(&mut outcome, ctx).await {
      Ok(()) => return Ok(outcome),
      Err(err) if outcome.kind == RenderKind::Error => return Err(RouterError::page_render(path, &err)),
      Err(err) => err,
    };
    tracing::error!(path, error = %err, "html render failed");
    let mut fallback = self.render_error(&split_path(path), &err, ctx).await?;
    self.render_html(&mut fallback, ctx).await.map_err(|e| RouterError::page_render(path, &e))?;
    Ok(fallback)
  }
}

/// Nearest `error` file from the slot page's directory up to the slot root.
fn find_slot_error(from: &Path, slot_root: &Path) -> Option<PathBuf> {
  let mut dir = Some(from);
  while let Some(d) = dir {
    if let Some(file) = find_file(d, FileKind::Error.stem(), true) {
      return Some(file);
    }
    if d == slot_root {
      break;
    }
    dir = d.parent();
  }
  None
}
