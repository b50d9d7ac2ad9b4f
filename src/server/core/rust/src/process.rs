/* src/server/core/rust/src/process.rs */

// Module runtime backed by a short-lived child process per call. The child
// receives one JSON request on stdin and answers with one JSON reply on
// stdout:
//
//   request: {"op": "renderTree", "element": {..}, "request": {..}, "build": false}
//   reply:   {"value": .., "error": "..", "accessed": ["cookies"], "effects": {..}}
//
// `accessed` and `effects` are replayed onto the caller's render context,
// so bailout detection and response side effects work across the process
// boundary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::context::ResponseEffects;
use crate::errors::{Result, RouterError};
use crate::matcher::Params;
use crate::render::{
  BoxFuture, ClientManifest, Element, ModuleRuntime, PageExports, RenderContext, StaticPathParams,
};

#[derive(Serialize)]
struct RequestView<'a> {
  method: &'a str,
  path: &'a str,
  query: &'a BTreeMap<String, String>,
  cookies: &'a BTreeMap<String, String>,
  headers: &'a BTreeMap<String, String>,
}

impl<'a> RequestView<'a> {
  fn of(ctx: &'a RenderContext) -> Self {
    Self {
      method: &ctx.req.method,
      path: &ctx.req.path,
      query: ctx.req.query.raw(),
      cookies: ctx.req.cookies.raw(),
      headers: ctx.req.headers.raw(),
    }
  }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Call<'a> {
  PageExports {
    module: &'a Path,
  },
  GetProps {
    module: &'a Path,
    params: &'a Params,
    request: RequestView<'a>,
    build: bool,
  },
  GetStaticPaths {
    module: &'a Path,
  },
  RenderTree {
    element: &'a Element,
    request: RequestView<'a>,
    build: bool,
  },
  #[serde(rename_all = "camelCase")]
  RenderHtml {
    tree: &'a Value,
    client_manifest: &'a ClientManifest,
    build: bool,
  },
}

#[derive(Debug, Default, Deserialize)]
struct Reply {
  #[serde(default)]
  value: Value,
  #[serde(default)]
  error: Option<String>,
  #[serde(default)]
  accessed: Vec<String>,
  #[serde(default)]
  effects: ResponseEffects,
}

#[derive(Debug, Clone)]
pub struct ProcessRuntime {
  command: String,
  current_dir: Option<PathBuf>,
}

impl ProcessRuntime {
  /// `command` runs through `sh -c`.
  pub fn new(command: impl Into<String>) -> Self {
    Self { command: command.into(), current_dir: None }
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.current_dir = Some(dir.into());
    self
  }

  pub fn command(&self) -> &str {
    &self.command
  }

  /// Serialise the call now so the returned future owns everything.
  fn call<T>(&self, call: &Call<'_>, ctx: Option<Arc<RenderContext>>) -> BoxFuture<Result<T>>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let payload = serde_json::to_vec(call);
    let runtime = self.clone();
    Box::pin(async move {
      let reply = runtime.invoke(payload?).await?;
      if let Some(ctx) = &ctx {
        replay(&reply, ctx);
      }
      if let Some(message) = reply.error {
        return Err(RouterError::Runtime(message));
      }
      serde_json::from_value(reply.value)
        .map_err(|e| RouterError::Process(format!("unexpected reply value: {e}")))
    })
  }

  async fn invoke(&self, payload: Vec<u8>) -> Result<Reply> {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", &self.command]);
    if let Some(dir) = &self.current_dir {
      cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
      .spawn()
      .map_err(|e| RouterError::Process(format!("failed to start `{}`: {e}", self.command)))?;

    // Feed stdin concurrently so a chatty child cannot fill its stdout
    // pipe while we are still writing.
    let writer = child.stdin.take().map(|mut stdin| {
      tokio::spawn(async move {
        if let Err(e) = stdin.write_all(&payload).await
          && e.kind() != std::io::ErrorKind::BrokenPipe
        {
          tracing::warn!(error = %e, "failed to write render request");
        }
      })
    });

    let output = child
      .wait_with_output()
      .await
      .map_err(|e| RouterError::Process(format!("failed to wait for `{}`: {e}", self.command)))?;
    if let Some(writer) = writer {
      let _ = writer.await;
    }

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let mut msg = format!("`{}` exited with status {}", self.command, output.status);
      if !stderr.trim().is_empty() {
        msg.push('\n');
        msg.push_str(stderr.trim());
      }
      return Err(RouterError::Process(msg));
    }
    serde_json::from_slice(&output.stdout)
      .map_err(|e| RouterError::Process(format!("malformed reply from `{}`: {e}", self.command)))
  }
}

fn replay(reply: &Reply, ctx: &RenderContext) {
  for name in &reply.accessed {
    match name.as_str() {
      "cookies" => ctx.req.cookies.note_external_access(),
      "headers" => ctx.req.headers.note_external_access(),
      "query" => ctx.req.query.note_external_access(),
      other => tracing::debug!(map = other, "ignoring unknown accessed map"),
    }
  }
  if !reply.effects.is_empty() {
    ctx.res.merge(reply.effects.clone());
  }
}

impl ModuleRuntime for ProcessRuntime {
  fn page_exports(&self, module: PathBuf) -> BoxFuture<Result<PageExports>> {
    self.call(&Call::PageExports { module: &module }, None)
  }

  fn get_props(
    &self,
    module: PathBuf,
    params: Params,
    ctx: Arc<RenderContext>,
  ) -> BoxFuture<Result<Value>> {
    let call = Call::GetProps {
      module: &module,
      params: &params,
      request: RequestView::of(&ctx),
      build: ctx.build,
    };
    self.call(&call, Some(ctx.clone()))
  }

  fn get_static_paths(&self, module: PathBuf) -> BoxFuture<Result<Vec<StaticPathParams>>> {
    self.call(&Call::GetStaticPaths { module: &module }, None)
  }

  fn render_tree(&self, element: Element, ctx: Arc<RenderContext>) -> BoxFuture<Result<Value>> {
    let call = Call::RenderTree { element: &element, request: RequestView::of(&ctx), build: ctx.build };
    self.call(&call, Some(ctx.clone()))
  }

  fn render_html(&self, tree: Value, ctx: Arc<RenderContext>) -> BoxFuture<Result<String>> {
    let call =
      Call::RenderHtml { tree: &tree, client_manifest: &ctx.client_manifest, build: ctx.build };
    self.call(&call, Some(ctx.clone()))
  }
}
