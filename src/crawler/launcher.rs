//! Bounded task launcher.
//!
//! `TaskLauncher` admits units of work through a counting semaphore of fixed
//! capacity. `launch` waits for a permit, spawns the unit onto the runtime
//! and returns without waiting for it to finish. The permit and the
//! outstanding count are released by guards owned by the spawned task, so
//! they are returned however the task ends, panics included.

use futures_util::FutureExt;
use log::{error, trace};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub struct TaskLauncher {
    semaphore: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    all_done: Arc<Notify>,
    capacity: usize,
}

struct OutstandingGuard {
    outstanding: Arc<AtomicUsize>,
    all_done: Arc<Notify>,
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_done.notify_waiters();
        }
    }
}

impl TaskLauncher {
    pub fn new(capacity: usize) -> Self {
        TaskLauncher {
            semaphore: Arc::new(Semaphore::new(capacity)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            all_done: Arc::new(Notify::new()),
            capacity,
        }
    }

    /// Waits for a permit, then starts `task` in the background.
    pub async fn launch<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Task launcher semaphore closed, dropping unit of work");
                return;
            }
        };

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = OutstandingGuard {
            outstanding: Arc::clone(&self.outstanding),
            all_done: Arc::clone(&self.all_done),
        };
        trace!(
            "Launching unit of work ({} outstanding)",
            self.outstanding.load(Ordering::SeqCst)
        );

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = permit;
            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                error!("A unit of work panicked");
            }
        });
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// True iff no launched unit of work is still running.
    pub fn all_done(&self) -> bool {
        self.outstanding() == 0
    }

    /// Waits until every launched unit of work has finished.
    pub async fn wait_all(&self) {
        loop {
            let notified = self.all_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.all_done() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let launcher = TaskLauncher::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let started = Instant::now();
        let mut launch_returned = Vec::new();
        for _ in 0..3 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            launcher
                .launch(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            launch_returned.push(started.elapsed());
        }

        // The third launch waits for one of the first two to finish.
        assert!(launch_returned[1] < Duration::from_millis(40));
        assert!(launch_returned[2] >= Duration::from_millis(45));
        assert!(!launcher.all_done());

        launcher.wait_all().await;
        assert!(launcher.all_done());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn panicking_task_returns_its_permit() {
        let launcher = TaskLauncher::new(1);
        launcher
            .launch(async {
                panic!("unit of work failed");
            })
            .await;
        launcher.wait_all().await;
        assert!(launcher.all_done());

        let (tx, rx) = tokio::sync::oneshot::channel();
        launcher
            .launch(async move {
                let _ = tx.send(());
            })
            .await;
        rx.await.unwrap();
        launcher.wait_all().await;
        assert_eq!(launcher.capacity(), 1);
    }

    #[tokio::test]
    async fn wait_all_returns_immediately_when_idle() {
        let launcher = TaskLauncher::new(4);
        tokio::time::timeout(Duration::from_secs(1), launcher.wait_all())
            .await
            .unwrap();
    }
}
