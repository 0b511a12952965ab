//! Delayed cleanup of profiles, jobs and artifacts.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Runs cleanup actions after a delay, one pending action per key.
///
/// Scheduling the same key again replaces the pending action, so
/// re-registering a profile or refreshing an artifact pushes its
/// deletion out instead of stacking timers.
#[derive(Default)]
pub struct ExpirationScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ExpirationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, superseding any pending action for
    /// the same key.
    pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = tasks.insert(key.clone(), handle) {
            previous.abort();
            debug!(key = %key, "Superseded pending expiration");
        }
    }

    /// Cancel the pending action for a key, if any.
    pub fn cancel(&self, key: &str) -> bool {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        match tasks.remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of pending actions, finished or not yet swept included.
    pub fn pending(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Drop for ExpirationScheduler {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.lock() {
            for handle in tasks.values() {
                handle.abort();
            }
        }
    }
}

/// Delete regular files in `dir` older than `max_age`.
///
/// A safety net under the per-key timers: anything the scheduler missed
/// (crash, abort) still gets reaped on the next sweep.
pub fn prune_dir(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut removed = 0;
    if !dir.is_dir() {
        return Ok(0);
    }
    let now = SystemTime::now();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("Skipping {} during prune: {}", path.display(), err);
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > max_age {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Pruned stale file {}", path.display());
                    removed += 1;
                }
                Err(err) => warn!("Failed to prune {}: {}", path.display(), err),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scheduled_action_runs() {
        let scheduler = ExpirationScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler.schedule("k", Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reschedule_supersedes() {
        let scheduler = ExpirationScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = fired.clone();
        scheduler.schedule("k", Duration::from_millis(10), async move {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = fired.clone();
        scheduler.schedule("k", Duration::from_millis(30), async move {
            second.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Only the replacement fired
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_prevents_action() {
        let scheduler = ExpirationScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler.schedule("k", Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel("k"));
        assert!(!scheduler.cancel("k"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prune_dir_removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("old.mp4");
        std::fs::write(&stale, b"x").unwrap();

        // max_age zero: everything qualifies once its mtime is in the past
        std::thread::sleep(Duration::from_millis(20));
        let removed = prune_dir(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());

        // A generous max_age spares fresh files
        let fresh = dir.path().join("new.mp4");
        std::fs::write(&fresh, b"x").unwrap();
        let removed = prune_dir(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 0);
        assert!(fresh.exists());
    }
}
