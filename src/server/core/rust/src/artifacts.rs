/* src/server/core/rust/src/artifacts.rs */

// On-disk static artifacts. Every write lands in a `*.tmp` sibling first and
// becomes visible only through rename; the previous file is copied to a
// `*._old.*` sibling so readers always find a complete version.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, RouterError};
use crate::matcher::split_path;

pub const HTML_FILE: &str = "index.html";
pub const RSC_FILE: &str = "rsc.rsc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { attempts: 5, base_delay: Duration::from_millis(20) }
  }
}

fn is_contention(err: &io::Error) -> bool {
  matches!(err.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy)
}

/// Run `op` until it succeeds, retrying EPERM/EBUSY with exponential
/// backoff. Other errors fail immediately.
pub(crate) async fn retry_contended<F, Fut>(
  from: &Path,
  to: &Path,
  policy: RetryPolicy,
  mut op: F,
) -> Result<()>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = io::Result<()>>,
{
  let attempts = policy.attempts.max(1);
  let mut attempt = 0;
  loop {
    match op().await {
      Ok(()) => return Ok(()),
      Err(e) if is_contention(&e) => {
        attempt += 1;
        if attempt >= attempts {
          return Err(RouterError::RenameContention {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            attempts,
          });
        }
        let delay = policy.base_delay.saturating_mul(1 << (attempt - 1).min(16));
        tracing::debug!(from = %from.display(), attempt, ?delay, "rename contended, retrying");
        tokio::time::sleep(delay).await;
      }
      Err(e) => {
        return Err(RouterError::io(format!("failed to rename {}", from.display()), e));
      }
    }
  }
}

pub async fn rename_with_retry(from: &Path, to: &Path, policy: RetryPolicy) -> Result<()> {
  retry_contended(from, to, policy, || tokio::fs::rename(from, to)).await
}

fn sibling(path: &Path, name: String) -> PathBuf {
  path.with_file_name(name)
}

fn file_name(path: &Path) -> String {
  path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// `index.html` -> `index.html.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
  sibling(path, format!("{}.tmp", file_name(path)))
}

/// `index.html` -> `index._old.html`
pub fn old_path(path: &Path) -> PathBuf {
  let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
  match path.extension() {
    Some(ext) => sibling(path, format!("{stem}._old.{}", ext.to_string_lossy())),
    None => sibling(path, format!("{stem}._old")),
  }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
  match tokio::fs::remove_file(path).await {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
  tokio::fs::write(path, contents)
    .await
    .map_err(|e| RouterError::io(format!("failed to write {}", path.display()), e))
}

/// Artifact locations for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
  pub dir: PathBuf,
  pub html: PathBuf,
  pub rsc: PathBuf,
}

impl ArtifactPaths {
  /// `<dist>/<path>/index.html` and `rsc.rsc` for a normalized path. `.`
  /// and `..` segments are dropped so a route can never escape `dist`.
  pub fn for_route(dist: &Path, path: &str) -> Self {
    let mut dir = dist.to_path_buf();
    for segment in split_path(path) {
      if segment == "." || segment == ".." || segment.contains('\\') {
        continue;
      }
      dir.push(segment);
    }
    Self { html: dir.join(HTML_FILE), rsc: dir.join(RSC_FILE), dir }
  }

  fn pairs(&self) -> [&PathBuf; 2] {
    [&self.html, &self.rsc]
  }

  pub fn exists(&self) -> bool {
    self.html.is_file() || old_path(&self.html).is_file()
  }

  async fn write_temp(&self, target: &Path, contents: &str) -> Result<()> {
    tokio::fs::create_dir_all(&self.dir)
      .await
      .map_err(|e| RouterError::io(format!("failed to create {}", self.dir.display()), e))?;
    write_file(&tmp_path(target), contents).await
  }

  pub async fn write_html_temp(&self, html: &str) -> Result<()> {
    self.write_temp(&self.html, html).await
  }

  pub async fn write_rsc_temp(&self, rsc: &str) -> Result<()> {
    self.write_temp(&self.rsc, rsc).await
  }

  /// Remove both temp files. Missing files are fine.
  pub async fn discard_temp(&self) {
    for target in self.pairs() {
      let tmp = tmp_path(target);
      if let Err(e) = remove_if_exists(&tmp).await {
        tracing::warn!(file = %tmp.display(), error = %e, "failed to remove temp artifact");
      }
    }
  }

  /// Promote both temp files. On failure, already-promoted artifacts are
  /// restored from their backups and temp files are removed, so the
  /// previous pair stays in place.
  pub async fn commit(&self, policy: RetryPolicy) -> Result<()> {
    if let Err(err) = self.back_up().await {
      self.discard_temp().await;
      return Err(err);
    }

    let mut promoted: Vec<&PathBuf> = Vec::new();
    for target in self.pairs() {
      if let Err(err) = rename_with_retry(&tmp_path(target), target, policy).await {
        for done in promoted {
          self.restore(done, policy).await;
        }
        self.discard_temp().await;
        return Err(err);
      }
      promoted.push(target);
    }

    for target in self.pairs() {
      let _ = remove_if_exists(&old_path(target)).await;
    }
    Ok(())
  }

  async fn back_up(&self) -> Result<()> {
    for target in self.pairs() {
      if target.is_file() {
        tokio::fs::copy(target, old_path(target))
          .await
          .map_err(|e| RouterError::io(format!("failed to back up {}", target.display()), e))?;
      }
    }
    Ok(())
  }

  /// Put the backup back through the temp sibling and a rename; readers
  /// never observe a partially restored file.
  async fn restore(&self, target: &Path, policy: RetryPolicy) {
    let old = old_path(target);
    if !old.is_file() {
      return;
    }
    let staged = tmp_path(target);
    let restored = match tokio::fs::copy(&old, &staged).await {
      Ok(_) => rename_with_retry(&staged, target, policy).await,
      Err(e) => Err(RouterError::io(format!("failed to stage {}", old.display()), e)),
    };
    if let Err(e) = restored {
      tracing::error!(file = %target.display(), error = %e, "failed to restore artifact backup");
    }
  }

  async fn read_with_backup(target: &Path) -> Result<String> {
    match tokio::fs::read_to_string(target).await {
      Ok(s) => Ok(s),
      Err(e) if e.kind() == io::ErrorKind::NotFound => tokio::fs::read_to_string(old_path(target))
        .await
        .map_err(|e| RouterError::io(format!("failed to read {}", target.display()), e)),
      Err(e) => Err(RouterError::io(format!("failed to read {}", target.display()), e)),
    }
  }

  pub async fn read_html(&self) -> Result<String> {
    Self::read_with_backup(&self.html).await
  }

  pub async fn read_rsc(&self) -> Result<String> {
    Self::read_with_backup(&self.rsc).await
  }
}
