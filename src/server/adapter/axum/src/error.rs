/* src/server/adapter/axum/src/error.rs */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use trellis_server::RouterError;

/// Newtype wrapper to implement `IntoResponse` for `RouterError`.
/// Required because Rust's orphan rule prevents `impl IntoResponse for RouterError`
/// when both types are foreign to this crate.
pub(crate) struct AxumError(pub RouterError);

impl IntoResponse for AxumError {
  fn into_response(self) -> Response {
    let err = self.0;
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
      tracing::error!(error = %err, "request failed without a fallback component");
    }
    // Internals stay in the log; clients get the generic reason only.
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, format!("{} {reason}", status.as_u16())).into_response()
  }
}

impl From<RouterError> for AxumError {
  fn from(err: RouterError) -> Self {
    Self(err)
  }
}
