/* src/server/adapter/axum/src/handler/page.rs */

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use trellis_server::{
  CookieOp, RenderContext, RenderOutcome, RequestContext, ResponseEffects, RouterError,
  ServedSnapshot,
};

use super::AppState;
use crate::error::AxumError;

const RSC_CONTENT_TYPE: &str = "text/x-component";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const CACHE_HEADER: &str = "x-trellis-cache";

/// `?_rsc=1` or `Accept: text/x-component` asks for the serialised tree.
fn wants_rsc(query: &BTreeMap<String, String>, headers: &HeaderMap) -> bool {
  if query.contains_key("_rsc") {
    return true;
  }
  headers
    .get(ACCEPT)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|accept| accept.contains(RSC_CONTENT_TYPE))
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
  let mut cookies = BTreeMap::new();
  for value in headers.get_all(COOKIE).iter().filter_map(|v| v.to_str().ok()) {
    for pair in value.split(';') {
      if let Some((name, val)) = pair.trim().split_once('=') {
        cookies.insert(name.trim().to_string(), val.trim().to_string());
      }
    }
  }
  cookies
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
  headers
    .iter()
    .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
    .collect()
}

fn append(response: &mut Response, name: HeaderName, value: &str) {
  match HeaderValue::from_str(value) {
    Ok(v) => {
      response.headers_mut().append(name, v);
    }
    Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
  }
}

fn append_cookies(response: &mut Response, cookies: &[CookieOp]) {
  for op in cookies {
    append(response, SET_COOKIE, &op.to_header());
  }
}

fn body_response(status: u16, content_type: &str, body: String) -> Response {
  let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
  let mut response = (status, body).into_response();
  append(&mut response, CONTENT_TYPE, content_type);
  response
}

fn redirect_response(status: u16, url: &str) -> Response {
  let status = StatusCode::from_u16(status)
    .ok()
    .filter(StatusCode::is_redirection)
    .unwrap_or(StatusCode::TEMPORARY_REDIRECT);
  let mut response = status.into_response();
  append(&mut response, LOCATION, url);
  response
}

async fn snapshot_response(hit: &ServedSnapshot, rsc: bool) -> Result<Response, RouterError> {
  let snapshot = &hit.snapshot;
  let mut response = match &snapshot.side_effects.redirect_url {
    Some(url) => redirect_response(307, url),
    None if rsc => body_response(snapshot.status, RSC_CONTENT_TYPE, hit.artifacts.read_rsc().await?),
    None => body_response(snapshot.status, HTML_CONTENT_TYPE, hit.artifacts.read_html().await?),
  };
  append_cookies(&mut response, &snapshot.side_effects.cookies);
  append(&mut response, HeaderName::from_static(CACHE_HEADER), if hit.stale { "STALE" } else { "HIT" });
  Ok(response)
}

fn live_response(outcome: RenderOutcome, rsc: bool) -> Response {
  let RenderOutcome { status, tree, html, effects, .. } = outcome;
  let ResponseEffects { headers, cookies, redirect, .. } = effects;
  let mut response = match redirect {
    Some(r) => redirect_response(r.status, &r.url),
    None if rsc => body_response(status, RSC_CONTENT_TYPE, tree.to_string()),
    None => body_response(status, HTML_CONTENT_TYPE, html),
  };
  for (name, value) in headers {
    match HeaderName::from_bytes(name.as_bytes()) {
      Ok(name) => append(&mut response, name, &value),
      Err(_) => tracing::warn!(header = %name, "dropping invalid header name"),
    }
  }
  append_cookies(&mut response, &cookies);
  append(&mut response, HeaderName::from_static(CACHE_HEADER), "MISS");
  response
}

pub(super) async fn handle_page(
  State(state): State<Arc<AppState>>,
  method: Method,
  uri: Uri,
  Query(query): Query<BTreeMap<String, String>>,
  headers: HeaderMap,
) -> Result<Response, AxumError> {
  if method != Method::GET && method != Method::HEAD {
    return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
  }
  let path = uri.path();
  let rsc = wants_rsc(&query, &headers);

  if let Some(hit) = state.generator.serve(path) {
    match snapshot_response(&hit, rsc).await {
      Ok(response) => return Ok(response),
      Err(e) => tracing::warn!(path, error = %e, "snapshot unreadable, rendering live"),
    }
  }

  let req = RequestContext::live(method.as_str(), path, query, parse_cookies(&headers), header_map(&headers));
  let ctx = Arc::new(RenderContext::new(req, state.client_manifest.clone(), false));
  let outcome = state
    .limiter
    .run(async {
      if rsc { state.composer.render_tree(path, &ctx).await } else { state.composer.render(path, &ctx).await }
    })
    .await?;
  tracing::debug!(path, status = outcome.status, kind = ?outcome.kind, "rendered live");
  Ok(live_response(outcome, rsc))
}
