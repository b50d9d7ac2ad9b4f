/* src/server/core/rust/src/limiter.rs */

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Caps how many renders run at once. Waiters are admitted in arrival
/// order (tokio's semaphore is fair).
#[derive(Debug, Clone)]
pub struct Limiter {
  semaphore: Arc<Semaphore>,
  size: usize,
}

impl Limiter {
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    Self { semaphore: Arc::new(Semaphore::new(size)), size }
  }

  /// Twice the available parallelism.
  pub fn default_size() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get()) * 2
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn available(&self) -> usize {
    self.semaphore.available_permits()
  }

  /// Run `task` once a slot is free. The slot is released when the task
  /// finishes, whatever it returns, or when the returned future is dropped.
  pub async fn run<F, T>(&self, task: F) -> T
  where
    F: Future<Output = T>,
  {
    // The semaphore is never closed, so acquire cannot fail in practice.
    let _permit = self.semaphore.acquire().await.ok();
    task.await
  }
}

impl Default for Limiter {
  fn default() -> Self {
    Self::new(Self::default_size())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use parking_lot::Mutex;
  use tokio::sync::oneshot;

  use super::*;

  #[test]
  fn default_size_is_positive_and_even() {
    let n = Limiter::default_size();
    assert!(n >= 2);
    assert_eq!(n % 2, 0);
    assert_eq!(Limiter::new(0).size(), 1);
  }

  #[tokio::test]
  async fn never_exceeds_its_size() {
    let limiter = Limiter::new(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..6 {
      let (limiter, running, peak) = (limiter.clone(), running.clone(), peak.clone());
      handles.push(tokio::spawn(async move {
        limiter
          .run(async {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            running.fetch_sub(1, Ordering::SeqCst);
          })
          .await;
      }));
    }
    for h in handles {
      h.await.unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.available(), 2);
  }

  #[tokio::test]
  async fn queued_tasks_start_in_arrival_order() {
    let limiter = Limiter::new(1);
    let (release, gate) = oneshot::channel::<()>();
    let holder = {
      let limiter = limiter.clone();
      tokio::spawn(async move {
        limiter
          .run(async {
            let _ = gate.await;
          })
          .await;
      })
    };
    tokio::task::yield_now().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..4 {
      let (limiter, order) = (limiter.clone(), order.clone());
      handles.push(tokio::spawn(async move {
        limiter.run(async move { order.lock().push(i) }).await;
      }));
      tokio::task::yield_now().await;
    }
    release.send(()).unwrap();
    holder.await.unwrap();
    for h in handles {
      h.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
  }

  #[tokio::test]
  async fn failed_task_releases_its_slot() {
    let limiter = Limiter::new(1);
    let result: Result<(), &str> = limiter.run(async { Err("boom") }).await;
    assert!(result.is_err());
    assert_eq!(limiter.available(), 1);
    assert_eq!(limiter.run(async { 5 }).await, 5);
  }
}
