/* src/server/core/rust/src/lifecycle/tests.rs */

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use walkdir::WalkDir;

use super::*;
use crate::render::StaticPathParams;
use crate::testing::{StubRuntime, app_tree};

fn generator(app: &Path, dist: &Path, runtime: Arc<StubRuntime>) -> Generator {
  let composer = Composer::new(app, runtime);
  Generator::new(composer, dist)
    .unwrap()
    .limiter(Limiter::new(4))
    .retry_policy(RetryPolicy { attempts: 2, base_delay: Duration::from_millis(1) })
}

fn params(value: serde_json::Value) -> StaticPathParams {
  StaticPathParams::Params(value.as_object().unwrap().clone())
}

fn leftover_temp_files(dist: &Path) -> Vec<PathBuf> {
  WalkDir::new(dist)
    .into_iter()
    .filter_map(|e| e.ok())
    .map(|e| e.into_path())
    .filter(|p| p.to_string_lossy().ends_with(".tmp"))
    .collect()
}

async fn settle(g: &Generator, path: &str) {
  for _ in 0..400 {
    if g.state_of(path) != PathState::Regenerating {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("regeneration of {path} never finished");
}

#[tokio::test]
async fn pages_reading_request_data_are_never_persisted() {
  let app = app_tree(&["page.tsx", "account/page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()).reads_cookies("account/page.tsx"));
  let g = generator(app.path(), dist.path(), runtime);

  let report = g.generate_startup().await.unwrap();
  assert_eq!(report.generated, vec!["/"]);
  assert_eq!(report.dynamic, vec!["/account"]);
  assert!(g.store().contains("/"));
  assert!(!g.store().contains("/account"));
  assert_eq!(g.state_of("/account"), PathState::Dynamic);
  assert!(!ArtifactPaths::for_route(dist.path(), "/account").exists());

  let root = ArtifactPaths::for_route(dist.path(), "/");
  assert!(root.read_html().await.unwrap().contains("page.tsx"));
  assert_eq!(g.status_manifest().get("/"), Some(200));
  assert!(dist.path().join("status-manifest.json").is_file());
}

#[tokio::test]
async fn startup_expands_static_paths_and_skips_live_pages() {
  let app = app_tree(&[
    "blog/[slug]/page.tsx",
    "blog/[slug]/page_functions.ts",
    "docs/[id]/page.tsx",
    "live/page.tsx",
    "live/page_functions.ts",
  ]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = StubRuntime::new(app.path())
    .exports(
      "blog/[slug]/page_functions.ts",
      PageExports { get_static_paths: true, ..Default::default() },
    )
    .static_paths(
      "blog/[slug]/page_functions.ts",
      vec![params(json!({"slug": "a"})), params(json!({"slug": "b"})), params(json!({}))],
    )
    .exports(
      "live/page_functions.ts",
      PageExports { dynamic: Some("force-dynamic".into()), ..Default::default() },
    );
  let g = generator(app.path(), dist.path(), Arc::new(runtime));

  let report = g.generate_startup().await.unwrap();
  assert_eq!(report.generated, vec!["/blog/a", "/blog/b"]);
  assert!(report.dynamic.contains(&"/live".to_string()));
  assert!(report.dynamic.contains(&"/docs/[id]".to_string()));
  assert!(report.failed.is_empty());
  assert_eq!(g.state_of("/live"), PathState::Missing);
}

#[tokio::test]
async fn encoded_slashes_keep_their_own_snapshot() {
  let app = app_tree(&[
    "blog/a/b/page.tsx",
    "blog/[slug]/page.tsx",
    "blog/[slug]/page_functions.ts",
  ]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = StubRuntime::new(app.path())
    .exports(
      "blog/[slug]/page_functions.ts",
      PageExports { get_static_paths: true, ..Default::default() },
    )
    .static_paths(
      "blog/[slug]/page_functions.ts",
      vec![params(json!({"slug": "a/b"})), params(json!({"slug": "100%"}))],
    );
  let g = generator(app.path(), dist.path(), Arc::new(runtime));

  let report = g.generate_startup().await.unwrap();
  assert_eq!(report.generated, vec!["/blog/100%25", "/blog/a%2Fb", "/blog/a/b"]);

  let encoded = g.serve("/blog/a%2Fb").unwrap();
  assert_eq!(encoded.snapshot.tree["module"], "blog/[slug]/page.tsx");
  assert_eq!(encoded.snapshot.tree["props"]["params"]["slug"], "a/b");
  assert!(encoded.artifacts.dir.ends_with("blog/a%2Fb"));

  let nested = g.serve("/blog/a/b").unwrap();
  assert_eq!(nested.snapshot.tree["module"], "blog/a/b/page.tsx");
  assert_ne!(encoded.artifacts.dir, nested.artifacts.dir);

  let percent = g.serve("/blog/100%25").unwrap();
  assert_eq!(percent.snapshot.tree["props"]["params"]["slug"], "100%");
  assert_eq!(g.status_manifest().get("/blog/a%2Fb"), Some(200));
}

#[tokio::test]
async fn failing_page_is_skipped_not_fatal() {
  let app = app_tree(&["page.tsx", "broken/page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()).failing("broken/page.tsx"));
  let g = generator(app.path(), dist.path(), runtime);

  let report = g.generate_startup().await.unwrap();
  assert_eq!(report.generated, vec!["/"]);
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].path, "/broken");
}

#[tokio::test]
async fn missing_app_dir_is_fatal() {
  let dir = tempfile::tempdir().unwrap();
  let dist = tempfile::tempdir().unwrap();
  let missing = dir.path().join("app");
  let runtime = Arc::new(StubRuntime::new(&missing));
  let g = generator(&missing, dist.path(), runtime);
  assert!(g.generate_startup().await.is_err());
}

#[tokio::test]
async fn redirect_during_build_is_kept_as_metadata() {
  let app = app_tree(&["page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()).redirects("page.tsx", "/login"));
  let g = generator(app.path(), dist.path(), runtime);

  let report = g.generate_startup().await.unwrap();
  assert_eq!(report.generated, vec!["/"]);
  let snapshot = g.store().get("/").unwrap();
  assert_eq!(snapshot.side_effects.redirect_url.as_deref(), Some("/login"));
}

#[tokio::test]
async fn failed_regeneration_leaves_previous_artifacts_untouched() {
  let app = app_tree(&["page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()));
  let g = generator(app.path(), dist.path(), runtime.clone());
  g.generate_startup().await.unwrap();

  let artifacts = ArtifactPaths::for_route(dist.path(), "/");
  let html_before = std::fs::read(&artifacts.html).unwrap();
  let rsc_before = std::fs::read(&artifacts.rsc).unwrap();
  let generated_at = g.store().get("/").unwrap().generated_at_ms;

  // The RSC temp file is written before the HTML pass throws.
  runtime.set_fail_html(true);
  let err = g.regenerate("/").await.unwrap_err();
  assert!(matches!(err, RouterError::Regeneration { .. }));

  assert_eq!(std::fs::read(&artifacts.html).unwrap(), html_before);
  assert_eq!(std::fs::read(&artifacts.rsc).unwrap(), rsc_before);
  assert!(leftover_temp_files(dist.path()).is_empty());
  assert_eq!(g.store().get("/").unwrap().generated_at_ms, generated_at);
  assert_eq!(g.state_of("/"), PathState::Fresh);
}

#[tokio::test]
async fn concurrent_stale_hits_trigger_one_regeneration() {
  let app = app_tree(&["page.tsx", "page_functions.ts"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(
    StubRuntime::new(app.path())
      .exports("page_functions.ts", PageExports { revalidate: Some(0), ..Default::default() })
      .delay(Duration::from_millis(30)),
  );
  let g = generator(app.path(), dist.path(), runtime.clone());
  g.generate_startup().await.unwrap();
  assert_eq!(runtime.html_renders.load(Ordering::SeqCst), 1);
  let original = g.store().get("/").unwrap().generated_at_ms;

  let (a, b) = tokio::join!(async { g.serve("/") }, async { g.serve("/") });
  let (a, b) = (a.unwrap(), b.unwrap());
  assert!(a.stale && b.stale);
  assert_eq!(a.snapshot.generated_at_ms, original);
  assert_eq!(g.state_of("/"), PathState::Regenerating);
  assert_eq!(g.regenerate("/").await.unwrap(), Rebuilt::Skipped);

  settle(&g, "/").await;
  assert_eq!(runtime.html_renders.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fresh_hits_do_not_regenerate() {
  let app = app_tree(&["page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()));
  let g = generator(app.path(), dist.path(), runtime.clone());
  g.generate_startup().await.unwrap();

  let served = g.serve("/?utm=1").unwrap();
  assert!(!served.stale);
  assert_eq!(g.state_of("/"), PathState::Fresh);
  assert_eq!(runtime.html_renders.load(Ordering::SeqCst), 1);
  assert!(served.artifacts.read_rsc().await.unwrap().contains("page.tsx"));
}

#[tokio::test]
async fn lock_is_exclusive_until_released() {
  let app = app_tree(&["page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let g = generator(app.path(), dist.path(), Arc::new(StubRuntime::new(app.path())));

  let guard = g.try_lock("/").unwrap();
  assert!(g.try_lock("/").is_none());
  assert_eq!(g.regenerate("/").await.unwrap(), Rebuilt::Skipped);
  drop(guard);
  assert_eq!(g.regenerate("/").await.unwrap(), Rebuilt::Committed { status: 200 });
}

#[tokio::test]
async fn page_turning_dynamic_reverts_to_live_rendering() {
  let app = app_tree(&["page.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let runtime = Arc::new(StubRuntime::new(app.path()));
  let g = generator(app.path(), dist.path(), runtime.clone());
  g.generate_startup().await.unwrap();
  let html_before = std::fs::read(ArtifactPaths::for_route(dist.path(), "/").html).unwrap();

  runtime.set_reads_cookies("page.tsx");
  assert_eq!(g.regenerate("/").await.unwrap(), Rebuilt::Dynamic);
  assert!(g.serve("/").is_none());
  assert_eq!(g.state_of("/"), PathState::Dynamic);
  assert_eq!(std::fs::read(ArtifactPaths::for_route(dist.path(), "/").html).unwrap(), html_before);
}

#[tokio::test]
async fn removed_page_regenerates_as_not_found() {
  let app = app_tree(&["page.tsx", "a/page.tsx", "not_found.tsx"]);
  let dist = tempfile::tempdir().unwrap();
  let g = generator(app.path(), dist.path(), Arc::new(StubRuntime::new(app.path())));
  g.generate_startup().await.unwrap();
  assert_eq!(g.status_manifest().get("/a"), Some(200));

  std::fs::remove_file(app.path().join("a/page.tsx")).unwrap();
  assert_eq!(g.regenerate("/a").await.unwrap(), Rebuilt::Committed { status: 404 });
  assert_eq!(StatusManifest::load(dist.path()).unwrap().get("/a"), Some(404));
}
