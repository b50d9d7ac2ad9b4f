/* src/server/adapter/axum/src/lib.rs */

mod error;
mod handler;

use trellis_server::{RouterError, TrellisApp, TrellisParts};

/// Re-export trellis-server core for convenience
pub use trellis_server;

/// Extension trait that converts a Trellis app into an Axum router.
pub trait IntoAxumRouter {
  fn into_axum_router(self) -> Result<axum::Router, RouterError>;

  /// Run the startup static generation pass, then serve. A failing pass
  /// aborts startup.
  fn serve(
    self,
    addr: &str,
  ) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error>>> + Send;
}

impl IntoAxumRouter for TrellisParts {
  fn into_axum_router(self) -> Result<axum::Router, RouterError> {
    Ok(handler::build_router(self))
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = self.generator.generate_startup().await?;
    tracing::info!(
      generated = report.generated.len(),
      dynamic = report.dynamic.len(),
      failed = report.failed.len(),
      "startup generation done"
    );
    let router = self.into_axum_router()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Trellis server running on http://localhost:{}", local_addr.port());
    axum::serve(listener, router).await?;
    Ok(())
  }
}

impl IntoAxumRouter for TrellisApp {
  fn into_axum_router(self) -> Result<axum::Router, RouterError> {
    self.into_parts()?.into_axum_router()
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    self.into_parts()?.serve(addr).await
  }
}
