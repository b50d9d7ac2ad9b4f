/* src/server/core/rust/src/lib.rs */

pub mod artifacts;
pub mod bailout;
pub mod compose;
pub mod context;
pub mod errors;
pub mod lifecycle;
pub mod limiter;
pub mod locator;
pub mod manifest;
pub mod matcher;
pub mod process;
pub mod render;
pub mod segment;
pub mod server;
pub mod snapshot;
pub mod static_paths;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for ergonomic use
pub use artifacts::{ArtifactPaths, RetryPolicy, rename_with_retry};
pub use bailout::{Access, AccessCallback, StaticFlag, TrackedMap};
pub use compose::{Composer, PropBags, RenderKind, RenderOutcome};
pub use context::{
  CookieOp, CookieOptions, Redirect, RequestContext, ResponseContext, ResponseEffects,
};
pub use errors::RouterError;
pub use lifecycle::{
  FailedPage, GenerationReport, Generator, PathState, Rebuilt, RegenerationGuard, ServedSnapshot,
};
pub use limiter::Limiter;
pub use locator::{
  LayoutEntry, PagePattern, ResolvedRoute, SlotEntry, enumerate_pages, layout_chain, locate,
  locate_fallback,
};
pub use manifest::StatusManifest;
pub use matcher::{
  FileKind, MatchOptions, ParamValue, Params, RouteMatch, TrailStep, encode_segment, match_route,
  normalize_path, split_path,
};
pub use process::ProcessRuntime;
pub use render::{
  BoxFuture, ClientManifest, Element, ModuleRuntime, PageExports, RenderContext, StaticPathParams,
};
pub use segment::{Segment, SegmentKind, classify};
pub use server::{TrellisApp, TrellisParts};
pub use snapshot::{SideEffects, SnapshotStore, StaticSnapshot};
pub use static_paths::expand_static_path;
