/* src/server/core/rust/src/static_paths.rs */

// Turns `getStaticPaths` entries into concrete request paths.
//
// Missing params are tolerated in the middle of a pattern: the segment is
// simply left out (`/reports/[[year]]/[reportId]` with no year becomes
// `/reports/<id>`). Only a missing *last* required param drops the entry.
// Param values are percent-encoded per segment, so `{"slug": "a/b"}` stays
// one segment.

use serde_json::Value;

use crate::matcher::encode_segment;
use crate::render::StaticPathParams;
use crate::segment::{Segment, SegmentKind};

fn scalar(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(encode_segment(s)),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn values(value: Option<&Value>) -> Vec<String> {
  match value {
    Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
    Some(v) => scalar(v).into_iter().collect(),
    None => Vec::new(),
  }
}

/// Concrete path for one entry, or `None` when the entry cannot produce a
/// valid URL for `pattern`.
pub fn expand_static_path(pattern: &[Segment], params: &StaticPathParams) -> Option<String> {
  let map = match params {
    StaticPathParams::Segments(parts) => {
      let parts: Vec<&str> = parts.iter().map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()).collect();
      return Some(format!("/{}", parts.join("/")));
    }
    StaticPathParams::Params(map) => map,
  };

  let last_required = pattern
    .iter()
    .rposition(|s| matches!(s.kind, SegmentKind::Dynamic | SegmentKind::CatchAll));

  let mut parts: Vec<String> = Vec::new();
  for (i, segment) in pattern.iter().enumerate() {
    match segment.kind {
      SegmentKind::Static => parts.push(encode_segment(&segment.name)),
      SegmentKind::Group | SegmentKind::Slot => {}
      SegmentKind::Dynamic | SegmentKind::OptionalSingle => {
        match map.get(&segment.name).and_then(scalar).filter(|s| !s.is_empty()) {
          Some(v) => parts.push(v),
          None if Some(i) == last_required => return None,
          None => {}
        }
      }
      SegmentKind::CatchAll | SegmentKind::OptionalCatchAll => {
        let items = values(map.get(&segment.name));
        if items.is_empty() && Some(i) == last_required {
          return None;
        }
        parts.extend(items);
      }
    }
  }
  Some(format!("/{}", parts.join("/")))
}
