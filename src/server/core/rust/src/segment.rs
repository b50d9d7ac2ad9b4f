/* src/server/core/rust/src/segment.rs */

// Directory-name syntax of the app tree. Every matcher decision switches on
// `SegmentKind`; names are parsed exactly once, here.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
  /// Literal URL segment.
  Static,
  /// `(name)`: organises files, never part of the URL.
  Group,
  /// `[name]`
  Dynamic,
  /// `[...name]`
  CatchAll,
  /// `[[...name]]`
  OptionalCatchAll,
  /// `[[name]]`
  OptionalSingle,
  /// `@name`: parallel slot, contributes a prop, never part of the URL.
  Slot,
}

impl SegmentKind {
  /// Forms that bind a route parameter.
  pub fn is_param(self) -> bool {
    matches!(self, Self::Dynamic | Self::CatchAll | Self::OptionalCatchAll | Self::OptionalSingle)
  }

  /// Forms that may match zero URL segments.
  pub fn is_optional(self) -> bool {
    matches!(self, Self::OptionalCatchAll | Self::OptionalSingle)
  }

  pub fn is_catch_all(self) -> bool {
    matches!(self, Self::CatchAll | Self::OptionalCatchAll)
  }

  /// Order in which non-static siblings are tried for a URL segment.
  pub(crate) fn precedence(self) -> u8 {
    match self {
      Self::Static => 0,
      Self::OptionalCatchAll => 1,
      Self::CatchAll => 2,
      Self::OptionalSingle => 3,
      Self::Dynamic => 4,
      Self::Group => 5,
      Self::Slot => 6,
    }
  }
}

/// One classified directory name. `name` is the bare identifier: the param
/// name for dynamic forms, the slot name without `@`, the group name without
/// parentheses, or the literal for static segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
  pub kind: SegmentKind,
  pub name: String,
}

fn non_empty(name: &str) -> Option<&str> {
  if name.is_empty() { None } else { Some(name) }
}

fn strip_wrapped<'a>(raw: &'a str, open: &str, close: &str) -> Option<&'a str> {
  raw.strip_prefix(open).and_then(|s| s.strip_suffix(close)).and_then(non_empty)
}

// `[...]` and `[[...]]` must not fall through to a single-segment param.
fn plain(name: &str) -> Option<&str> {
  if name.starts_with("...") || name.contains(['[', ']']) { None } else { Some(name) }
}

/// Classify a directory name. Malformed bracket names (`[]`, `[x`, `[[...]]`)
/// are treated as static literals.
pub fn classify(raw: &str) -> Segment {
  let (kind, name) = if let Some(n) = strip_wrapped(raw, "[[...", "]]") {
    (SegmentKind::OptionalCatchAll, n)
  } else if let Some(n) = strip_wrapped(raw, "[[", "]]").and_then(plain) {
    (SegmentKind::OptionalSingle, n)
  } else if let Some(n) = strip_wrapped(raw, "[...", "]") {
    (SegmentKind::CatchAll, n)
  } else if let Some(n) = strip_wrapped(raw, "[", "]").and_then(plain) {
    (SegmentKind::Dynamic, n)
  } else if let Some(n) = strip_wrapped(raw, "(", ")") {
    (SegmentKind::Group, n)
  } else if let Some(n) = raw.strip_prefix('@').and_then(non_empty) {
    (SegmentKind::Slot, n)
  } else {
    (SegmentKind::Static, raw)
  };
  Segment { kind, name: name.to_string() }
}
