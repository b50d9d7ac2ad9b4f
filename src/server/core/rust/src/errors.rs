/* src/server/core/rust/src/errors.rs */

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
  /// No `page` module matched the request path.
  #[error("no page matches {path}")]
  NotFound { path: String },

  /// A parallel slot threw while rendering. Contained by the composer,
  /// only surfaces when logged.
  #[error("slot @{slot} failed to render: {message}")]
  SlotRender { slot: String, message: String },

  /// Page or layout composition failed.
  #[error("page render failed for {path}: {message}")]
  PageRender { path: String, message: String },

  /// Background regeneration failed; old artifacts are retained.
  #[error("regeneration of {path} failed: {message}")]
  Regeneration { path: String, message: String },

  /// Rename kept hitting EPERM/EBUSY after every retry.
  #[error("rename {} -> {} still contended after {attempts} attempts", from.display(), to.display())]
  RenameContention { from: PathBuf, to: PathBuf, attempts: u32 },

  /// A render subprocess crashed or replied with garbage.
  #[error("render process failed: {0}")]
  Process(String),

  /// Error reported by the module runtime itself (thrown by user code).
  #[error("{0}")]
  Runtime(String),

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl RouterError {
  pub fn runtime(msg: impl Into<String>) -> Self {
    Self::Runtime(msg.into())
  }

  pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
    Self::Io { context: context.into(), source }
  }

  pub fn page_render(path: impl Into<String>, err: &RouterError) -> Self {
    Self::PageRender { path: path.into(), message: err.to_string() }
  }

  pub fn regeneration(path: impl Into<String>, err: &RouterError) -> Self {
    Self::Regeneration { path: path.into(), message: err.to_string() }
  }

  /// HTTP status a client would see if this error reached the response.
  pub fn http_status(&self) -> u16 {
    match self {
      Self::NotFound { .. } => 404,
      _ => 500,
    }
  }
}

pub type Result<T, E = RouterError> = std::result::Result<T, E>;
