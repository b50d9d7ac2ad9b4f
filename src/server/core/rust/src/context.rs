/* src/server/core/rust/src/context.rs */

// The narrow request/response surface the core needs from an HTTP server.
// Response calls are recorded, not applied: the adapter replays them onto
// the real response, and static builds persist them as snapshot metadata.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bailout::{StaticFlag, TrackedMap};

#[derive(Debug, Clone)]
pub struct RequestContext {
  pub method: String,
  pub path: String,
  pub query: TrackedMap,
  pub cookies: TrackedMap,
  pub headers: TrackedMap,
}

impl RequestContext {
  /// Live request: data maps are not observed.
  pub fn live(
    method: impl Into<String>,
    path: impl Into<String>,
    query: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
  ) -> Self {
    Self {
      method: method.into(),
      path: path.into(),
      query: TrackedMap::untracked(query),
      cookies: TrackedMap::untracked(cookies),
      headers: TrackedMap::untracked(headers),
    }
  }

  /// Build-time probe: fresh empty maps wired to `flag`. There is no real
  /// request during prerendering.
  pub fn probe(path: impl Into<String>, flag: &StaticFlag) -> Self {
    Self {
      method: "GET".to_string(),
      path: path.into(),
      query: TrackedMap::wrap(BTreeMap::new(), flag.callback("query")),
      cookies: TrackedMap::wrap(BTreeMap::new(), flag.callback("cookies")),
      headers: TrackedMap::wrap(BTreeMap::new(), flag.callback("headers")),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub domain: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_age: Option<i64>,
  #[serde(default)]
  pub http_only: bool,
  #[serde(default)]
  pub secure: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CookieOp {
  Set { name: String, value: String, #[serde(default)] options: CookieOptions },
  Clear { name: String, #[serde(default)] options: CookieOptions },
}

impl CookieOp {
  /// `Set-Cookie` header value.
  pub fn to_header(&self) -> String {
    let (name, value, options, clear) = match self {
      Self::Set { name, value, options } => (name, value.as_str(), options, false),
      Self::Clear { name, options } => (name, "", options, true),
    };
    let mut out = format!("{name}={value}");
    out.push_str(&format!("; Path={}", options.path.as_deref().unwrap_or("/")));
    if let Some(ref domain) = options.domain {
      out.push_str(&format!("; Domain={domain}"));
    }
    if clear {
      out.push_str("; Max-Age=0");
    } else if let Some(age) = options.max_age {
      out.push_str(&format!("; Max-Age={age}"));
    }
    if options.http_only {
      out.push_str("; HttpOnly");
    }
    if options.secure {
      out.push_str("; Secure");
    }
    if let Some(ref same_site) = options.same_site {
      out.push_str(&format!("; SameSite={same_site}"));
    }
    out
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
  pub status: u16,
  pub url: String,
}

/// Everything a page did to the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEffects {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub headers: Vec<(String, String)>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cookies: Vec<CookieOp>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub redirect: Option<Redirect>,
}

impl ResponseEffects {
  pub fn is_empty(&self) -> bool {
    self.status.is_none()
      && self.headers.is_empty()
      && self.cookies.is_empty()
      && self.redirect.is_none()
  }
}

/// Recording response handle shared with the module runtime.
#[derive(Debug, Default)]
pub struct ResponseContext {
  effects: Mutex<ResponseEffects>,
}

impl ResponseContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn status(&self, code: u16) {
    self.effects.lock().status = Some(code);
  }

  pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
    self.effects.lock().headers.push((name.into(), value.into()));
  }

  pub fn cookie(&self, name: impl Into<String>, value: impl Into<String>, options: CookieOptions) {
    let op = CookieOp::Set { name: name.into(), value: value.into(), options };
    self.effects.lock().cookies.push(op);
  }

  pub fn clear_cookie(&self, name: impl Into<String>, options: CookieOptions) {
    self.effects.lock().cookies.push(CookieOp::Clear { name: name.into(), options });
  }

  /// `redirect(url)`: temporary redirect.
  pub fn redirect(&self, url: impl Into<String>) {
    self.redirect_with_status(307, url);
  }

  /// `redirect(status, url)`.
  pub fn redirect_with_status(&self, status: u16, url: impl Into<String>) {
    self.effects.lock().redirect = Some(Redirect { status, url: url.into() });
  }

  /// Fold effects recorded elsewhere (a render subprocess) into this one.
  pub fn merge(&self, other: ResponseEffects) {
    let mut effects = self.effects.lock();
    if other.status.is_some() {
      effects.status = other.status;
    }
    effects.headers.extend(other.headers);
    effects.cookies.extend(other.cookies);
    if other.redirect.is_some() {
      effects.redirect = other.redirect;
    }
  }

  /// Forget the status and redirect of a render that then failed. Headers
  /// and cookies are kept.
  pub fn reset_outcome(&self) {
    let mut effects = self.effects.lock();
    effects.status = None;
    effects.redirect = None;
  }

  pub fn snapshot(&self) -> ResponseEffects {
    self.effects.lock().clone()
  }
}
