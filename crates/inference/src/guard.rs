//! Mutual-exclusion guard for handler critical sections.
//!
//! Rule handlers that perform read-modify-write updates on a shared
//! runtime fact (read the list, append, write back) must not interleave
//! or an update is lost. A [`RunGuard`] executes such sections strictly
//! one at a time, in FIFO order.
//!
//! A guard is created fresh for every engine run and threaded through
//! the handler context. It is never shared across runs.

use std::future::Future;

use tokio::sync::Mutex;

/// FIFO critical-section executor.
///
/// Built on [`tokio::sync::Mutex`], whose lock acquisition is fair:
/// queued sections run in the order they arrived. A section's outcome
/// (value or error) propagates to its caller; a failing section
/// releases the guard normally, so the queue never wedges.
#[derive(Debug, Default)]
pub struct RunGuard {
    lock: Mutex<()>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `section` exclusively, behind any currently running or
    /// queued section on this guard.
    pub async fn enter<F, Fut, T>(&self, section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _held = self.lock.lock().await;
        section().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_never_lost() {
        let guard = Arc::new(RunGuard::new());
        let list: Arc<RwLock<Vec<usize>>> = Arc::new(RwLock::new(Vec::new()));

        let sections = (0..16).map(|i| {
            let guard = guard.clone();
            let list = list.clone();
            tokio::spawn(async move {
                guard
                    .enter(|| async {
                        // Non-atomic read-modify-write: the yield forces
                        // an interleaving window between read and write.
                        let mut copy = list.read().await.clone();
                        tokio::task::yield_now().await;
                        copy.push(i);
                        *list.write().await = copy;
                    })
                    .await;
            })
        });
        join_all(sections).await;

        let finished = list.read().await;
        assert_eq!(finished.len(), 16);
        for i in 0..16 {
            assert!(finished.contains(&i));
        }
    }

    #[tokio::test]
    async fn failing_section_releases_the_guard() {
        let guard = RunGuard::new();

        let outcome: Result<(), &str> = guard.enter(|| async { Err("handler failed") }).await;
        assert_eq!(outcome, Err("handler failed"));

        // The next queued section still runs.
        let outcome: Result<i32, &str> = guard.enter(|| async { Ok(7) }).await;
        assert_eq!(outcome, Ok(7));
    }

    #[tokio::test]
    async fn sections_run_in_fifo_order_when_queued() {
        let guard = Arc::new(RunGuard::new());
        let order: Arc<RwLock<Vec<usize>>> = Arc::new(RwLock::new(Vec::new()));

        // Hold the guard while the queue builds up, then release.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .enter(|| async {
                        rx.await.ok();
                    })
                    .await;
            })
        };
        tokio::task::yield_now().await;

        let mut waiters = Vec::new();
        for i in 0..4 {
            let guard = guard.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                guard
                    .enter(|| async {
                        order.write().await.push(i);
                    })
                    .await;
            }));
            // Let each waiter enqueue before the next arrives.
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        tx.send(()).ok();
        holder.await.unwrap();
        join_all(waiters).await;

        assert_eq!(*order.read().await, vec![0, 1, 2, 3]);
    }
}
