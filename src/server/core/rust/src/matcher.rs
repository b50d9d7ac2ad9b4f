/* src/server/core/rust/src/matcher.rs */

// Segment matcher: resolves URL segments against the app directory tree.
// Precedence at every level: verbatim static dir, then optional catch-all,
// catch-all, optional single, single dynamic, then route groups (same
// segment retried inside). Catch-all directories are leaves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Serialize;

use crate::segment::{Segment, SegmentKind, classify};

/// Extensions tried, in order, for module files.
pub const EXTENSIONS: [&str; 4] = ["tsx", "ts", "jsx", "js"];

/// Logical file kinds the router looks up inside a route directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
  Page,
  Layout,
  Error,
  NotFound,
  PageFunctions,
  ResetLayout,
  NoLayout,
  NoLayoutError,
  NoLayoutNotFound,
}

impl FileKind {
  pub fn stem(self) -> &'static str {
    match self {
      Self::Page => "page",
      Self::Layout => "layout",
      Self::Error => "error",
      Self::NotFound => "not_found",
      Self::PageFunctions => "page_functions",
      Self::ResetLayout => "reset_layout",
      Self::NoLayout => "no_layout",
      Self::NoLayoutError => "no_layout_error",
      Self::NoLayoutNotFound => "no_layout_not_found",
    }
  }

  /// Marker files carry no extension and their content is ignored.
  pub fn is_marker(self) -> bool {
    matches!(self, Self::ResetLayout | Self::NoLayout | Self::NoLayoutError | Self::NoLayoutNotFound)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
  pub with_extension: bool,
}

impl MatchOptions {
  pub fn for_kind(kind: FileKind) -> Self {
    Self { with_extension: !kind.is_marker() }
  }
}

impl Default for MatchOptions {
  fn default() -> Self {
    Self { with_extension: true }
  }
}

/// Value bound to a dynamic directory on the winning path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
  One(String),
  Many(Vec<String>),
  /// Optional single segment that matched nothing.
  Absent,
}

impl ParamValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::One(s) => Some(s),
      _ => None,
    }
  }
}

pub type Params = BTreeMap<String, ParamValue>;

/// A directory entered on the winning path and the number of URL segments
/// consumed before entering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailStep {
  pub dir: PathBuf,
  pub consumed: usize,
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
  pub module_path: PathBuf,
  pub params: Params,
  /// Root to leaf; groups included, slots never.
  pub trail: Vec<TrailStep>,
}

impl RouteMatch {
  fn leaf(module_path: PathBuf, step: TrailStep) -> Self {
    Self { module_path, params: Params::new(), trail: vec![step] }
  }

  fn under(mut self, step: TrailStep) -> Self {
    self.trail.insert(0, step);
    self
  }

  fn bind(mut self, name: &str, value: ParamValue) -> Self {
    self.params.entry(name.to_string()).or_insert(value);
    self
  }

  /// Directory holding the matched module.
  pub fn leaf_dir(&self) -> &Path {
    self.trail.last().map_or_else(|| Path::new(""), |s| s.dir.as_path())
  }
}

/// Split a request path into raw segments. Empty segments and any query
/// string are dropped.
pub fn split_path(path: &str) -> Vec<String> {
  let path = path.split(['?', '#']).next().unwrap_or("");
  path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Percent-decode a segment, falling back to the raw text when the decoded
/// bytes are not UTF-8.
pub fn decode_segment(raw: &str) -> String {
  match percent_decode_str(raw).decode_utf8() {
    Ok(decoded) => decoded.into_owned(),
    Err(_) => raw.to_string(),
  }
}

/// Bytes that would change how a key splits or decodes again.
const KEY_RESERVED: &AsciiSet = &CONTROLS.add(b'%').add(b'/').add(b'?').add(b'#');

/// Everything outside the RFC 3986 path-segment characters, plus `/`.
const SEGMENT_RESERVED: &AsciiSet = &KEY_RESERVED
  .add(b' ')
  .add(b'"')
  .add(b'<')
  .add(b'>')
  .add(b'`')
  .add(b'{')
  .add(b'}');

/// Percent-encode one path segment so it survives `split_path` and decodes
/// back to `raw`.
pub fn encode_segment(raw: &str) -> String {
  utf8_percent_encode(raw, SEGMENT_RESERVED).to_string()
}

/// Canonical snapshot key for a request path: decoded segments joined
/// with `/`, always rooted. `/a//b/?x=1` and `/a/b` share a key. Inside a
/// segment `%`, `/`, `?` and `#` stay encoded, so `/a%2Fb` keeps its own key
/// and the key splits and decodes to the segments `match_route` sees.
pub fn normalize_path(path: &str) -> String {
  let segments: Vec<String> = split_path(path)
    .iter()
    .map(|s| utf8_percent_encode(&decode_segment(s), KEY_RESERVED).to_string())
    .collect();
  format!("/{}", segments.join("/"))
}

/// First existing `<stem>.<ext>` (or bare `<stem>`) in `dir`.
pub fn find_file(dir: &Path, stem: &str, with_extension: bool) -> Option<PathBuf> {
  if !with_extension {
    let candidate = dir.join(stem);
    return candidate.is_file().then_some(candidate);
  }
  EXTENSIONS.iter().map(|ext| dir.join(format!("{stem}.{ext}"))).find(|p| p.is_file())
}

pub(crate) struct Child {
  pub path: PathBuf,
  pub segment: Segment,
}

/// Subdirectories of `dir`, classified and sorted by precedence then name.
/// Unreadable directories yield nothing.
pub(crate) fn read_children(dir: &Path) -> Vec<Child> {
  let Ok(entries) = std::fs::read_dir(dir) else {
    return Vec::new();
  };
  let mut children: Vec<Child> = entries
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
    .filter_map(|e| {
      let name = e.file_name().to_str()?.to_string();
      Some(Child { path: e.path(), segment: classify(&name) })
    })
    .collect();
  children.sort_by(|a, b| {
    a.segment
      .kind
      .precedence()
      .cmp(&b.segment.kind.precedence())
      .then_with(|| a.segment.name.cmp(&b.segment.name))
  });
  children
}

/// Resolve `segments` (raw, still percent-encoded) under `root` to a file of
/// `kind`. Returns `None` when nothing matches; absence is not an error.
pub fn match_route(
  segments: &[String],
  root: &Path,
  kind: FileKind,
  opts: MatchOptions,
) -> Option<RouteMatch> {
  let decoded: Vec<String> = segments.iter().map(|s| decode_segment(s)).collect();
  let matcher = Matcher { segments: &decoded, stem: kind.stem(), with_extension: opts.with_extension };
  matcher.walk(root, 0)
}

struct Matcher<'a> {
  segments: &'a [String],
  stem: &'static str,
  with_extension: bool,
}

impl Matcher<'_> {
  fn file_in(&self, dir: &Path) -> Option<PathBuf> {
    find_file(dir, self.stem, self.with_extension)
  }

  fn walk(&self, dir: &Path, index: usize) -> Option<RouteMatch> {
    if index >= self.segments.len() {
      return self.walk_exhausted(dir, index);
    }
    let step = TrailStep { dir: dir.to_path_buf(), consumed: index };
    let segment = &self.segments[index];
    let children = read_children(dir);

    if let Some(child) =
      children.iter().find(|c| c.segment.kind == SegmentKind::Static && c.segment.name == *segment)
      && let Some(m) = self.walk(&child.path, index + 1)
    {
      return Some(m.under(step));
    }

    for child in &children {
      let name = child.segment.name.as_str();
      let found = match child.segment.kind {
        SegmentKind::OptionalCatchAll | SegmentKind::CatchAll => self.catch_all(child, index),
        SegmentKind::OptionalSingle => self
          .walk(&child.path, index + 1)
          .map(|m| m.bind(name, ParamValue::One(segment.clone())))
          .or_else(|| self.walk(&child.path, index).map(|m| m.bind(name, ParamValue::Absent))),
        SegmentKind::Dynamic => {
          self.walk(&child.path, index + 1).map(|m| m.bind(name, ParamValue::One(segment.clone())))
        }
        SegmentKind::Group => self.walk(&child.path, index),
        SegmentKind::Static | SegmentKind::Slot => None,
      };
      if let Some(m) = found {
        return Some(m.under(step));
      }
    }
    None
  }

  /// All segments consumed: the file must live here, or behind something
  /// that can match zero segments.
  fn walk_exhausted(&self, dir: &Path, index: usize) -> Option<RouteMatch> {
    let step = TrailStep { dir: dir.to_path_buf(), consumed: index };
    if let Some(file) = self.file_in(dir) {
      return Some(RouteMatch::leaf(file, step));
    }
    for child in read_children(dir) {
      let name = child.segment.name.as_str();
      let found = match child.segment.kind {
        SegmentKind::OptionalCatchAll => self.catch_all(&child, index),
        SegmentKind::OptionalSingle => {
          self.walk(&child.path, index).map(|m| m.bind(name, ParamValue::Absent))
        }
        SegmentKind::Group => self.walk(&child.path, index),
        _ => None,
      };
      if let Some(m) = found {
        return Some(m.under(step));
      }
    }
    None
  }

  /// Catch-alls swallow every remaining segment and are leaves.
  fn catch_all(&self, child: &Child, index: usize) -> Option<RouteMatch> {
    let rest = self.segments.get(index..).unwrap_or_default().to_vec();
    if rest.is_empty() && child.segment.kind == SegmentKind::CatchAll {
      return None;
    }
    let file = self.file_in(&child.path)?;
    let step = TrailStep { dir: child.path.clone(), consumed: index };
    Some(RouteMatch::leaf(file, step).bind(&child.segment.name, ParamValue::Many(rest)))
  }
}
