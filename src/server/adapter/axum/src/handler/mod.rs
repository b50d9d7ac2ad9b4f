/* src/server/adapter/axum/src/handler/mod.rs */

mod page;

use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;
use trellis_server::{ClientManifest, Composer, Generator, Limiter, TrellisParts};

pub(crate) struct AppState {
  pub composer: Composer,
  pub generator: Generator,
  pub limiter: Limiter,
  pub client_manifest: Arc<ClientManifest>,
}

/// Every GET goes through the page handler. When a public directory is
/// configured, existing files there win over routes.
pub(crate) fn build_router(parts: TrellisParts) -> Router {
  let state = Arc::new(AppState {
    composer: parts.composer,
    generator: parts.generator,
    limiter: parts.limiter,
    client_manifest: parts.client_manifest,
  });
  let pages = Router::new().fallback(page::handle_page).with_state(state);

  match parts.public_dir {
    Some(dir) => Router::new().fallback_service(ServeDir::new(dir).fallback(pages)),
    None => pages,
  }
}
