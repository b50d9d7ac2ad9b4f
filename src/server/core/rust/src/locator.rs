/* src/server/core/rust/src/locator.rs */

// Module locator: typed file lookup on top of the matcher, the layout chain
// (with parallel slots) for a matched page, and page enumeration for
// static generation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::matcher::{
  FileKind, MatchOptions, Params, RouteMatch, TrailStep, find_file, match_route, read_children,
};
use crate::segment::{Segment, SegmentKind, classify};

pub type ResolvedRoute = RouteMatch;

/// Resolve `segments` to a file of `kind`. `None` when absent.
pub fn locate(segments: &[String], root: &Path, kind: FileKind) -> Option<ResolvedRoute> {
  match_route(segments, root, kind, MatchOptions::for_kind(kind))
}

/// Lookup chain for `not_found` / `error`: the full path first, then each
/// shorter prefix, so the deepest file along the path wins.
pub fn locate_fallback(segments: &[String], root: &Path, kind: FileKind) -> Option<ResolvedRoute> {
  (0..=segments.len()).rev().find_map(|n| locate(&segments[..n], root, kind))
}

pub fn has_marker(dir: &Path, kind: FileKind) -> bool {
  find_file(dir, kind.stem(), false).is_some()
}

/// Parallel slot content for one layout level.
#[derive(Debug, Clone)]
pub struct SlotEntry {
  pub dir: PathBuf,
  /// Slot page for the segments remaining below the layout, if any.
  pub page: Option<ResolvedRoute>,
}

/// One level of the layout chain.
#[derive(Debug, Clone)]
pub struct LayoutEntry {
  pub dir: PathBuf,
  /// `None` for a `reset_layout` directory that has no layout of its own.
  pub module: Option<PathBuf>,
  /// Params bound at or above this directory.
  pub params: Params,
  pub slots: BTreeMap<String, SlotEntry>,
  /// Directory carries a `reset_layout` marker.
  pub reset: bool,
}

/// Layouts along the matched trail, root to leaf. Each entry only sees the
/// params of directories at or above it.
pub fn layout_chain(route: &ResolvedRoute, segments: &[String]) -> Vec<LayoutEntry> {
  let mut bound: BTreeSet<String> = BTreeSet::new();
  let mut chain = Vec::new();

  for step in &route.trail {
    if let Some(name) = step.dir.file_name().and_then(|n| n.to_str()) {
      let segment = classify(name);
      if segment.kind.is_param() {
        bound.insert(segment.name);
      }
    }

    let module = find_file(&step.dir, FileKind::Layout.stem(), true);
    let reset = has_marker(&step.dir, FileKind::ResetLayout);
    if module.is_none() && !reset {
      continue;
    }

    let params: Params =
      route.params.iter().filter(|(k, _)| bound.contains(*k)).map(|(k, v)| (k.clone(), v.clone())).collect();
    let slots = if module.is_some() { slots_at(step, segments, &route.params) } else { BTreeMap::new() };
    chain.push(LayoutEntry { dir: step.dir.clone(), module, params, slots, reset });
  }
  chain
}

fn slots_at(step: &TrailStep, segments: &[String], params: &Params) -> BTreeMap<String, SlotEntry> {
  let rest = segments.get(step.consumed..).unwrap_or_default();
  let mut slots = BTreeMap::new();
  for (name, dir) in find_slot_dirs(&step.dir) {
    let page = locate(rest, &dir, FileKind::Page).map(|mut m| {
      for (k, v) in params {
        m.params.entry(k.clone()).or_insert_with(|| v.clone());
      }
      m
    });
    slots.entry(name).or_insert(SlotEntry { dir, page });
  }
  slots
}

/// `@name` directories beside a layout, looking through route groups.
/// A slot directly in `dir` shadows a same-named one inside a group.
pub fn find_slot_dirs(dir: &Path) -> Vec<(String, PathBuf)> {
  let mut found = Vec::new();
  let mut groups = Vec::new();
  for child in read_children(dir) {
    match child.segment.kind {
      SegmentKind::Slot => found.push((child.segment.name, child.path)),
      SegmentKind::Group => groups.push(child.path),
      _ => {}
    }
  }
  for group in groups {
    for (name, path) in find_slot_dirs(&group) {
      if !found.iter().any(|(n, _)| *n == name) {
        found.push((name, path));
      }
    }
  }
  found
}

/// A routable page and the URL pattern its directory encodes.
#[derive(Debug, Clone)]
pub struct PagePattern {
  pub module_path: PathBuf,
  pub dir: PathBuf,
  /// URL-visible segments, root to leaf (groups removed).
  pub pattern: Vec<Segment>,
}

impl PagePattern {
  pub fn is_dynamic(&self) -> bool {
    self.pattern.iter().any(|s| s.kind.is_param())
  }

  /// Route in directory syntax, e.g. `/blog/[slug]`.
  pub fn route(&self) -> String {
    let parts: Vec<String> = self
      .pattern
      .iter()
      .map(|s| match s.kind {
        SegmentKind::Dynamic => format!("[{}]", s.name),
        SegmentKind::CatchAll => format!("[...{}]", s.name),
        SegmentKind::OptionalCatchAll => format!("[[...{}]]", s.name),
        SegmentKind::OptionalSingle => format!("[[{}]]", s.name),
        _ => s.name.clone(),
      })
      .collect();
    format!("/{}", parts.join("/"))
  }
}

/// Every page under `root` that is reachable by URL. Pages inside slot
/// directories are not routes of their own.
pub fn enumerate_pages(root: &Path) -> Vec<PagePattern> {
  let mut pages = Vec::new();
  for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(Result::ok) {
    if !entry.file_type().is_dir() {
      continue;
    }
    let dir = entry.path();
    let Some(module_path) = find_file(dir, FileKind::Page.stem(), true) else {
      continue;
    };
    let Ok(rel) = dir.strip_prefix(root) else {
      continue;
    };
    let segments: Vec<Segment> =
      rel.iter().filter_map(|c| c.to_str()).map(classify).collect();
    if segments.iter().any(|s| s.kind == SegmentKind::Slot) {
      continue;
    }
    let pattern = segments.into_iter().filter(|s| s.kind != SegmentKind::Group).collect();
    pages.push(PagePattern { module_path, dir: dir.to_path_buf(), pattern });
  }
  pages
}
