// src/exec/pool.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Per-instance worker pool.
///
/// Every submission is its own Tokio task; with `threads > 0` at most that
/// many run at once and the rest wait for a permit ("pool-queued").
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    /// `threads == 0` means unbounded.
    pub fn new(threads: usize) -> Self {
        let permits = (threads > 0).then(|| Arc::new(Semaphore::new(threads)));
        Self { permits }
    }

    pub fn spawn<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // Pool shut down while queued.
                    Err(_) => return,
                },
                None => None,
            };
            work.await;
        })
    }

    /// Queued work never starts after this; running work is unaffected.
    pub fn shutdown_now(&self) {
        if let Some(sem) = &self.permits {
            sem.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn bounded_pool_limits_concurrency() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let active = active.clone();
                let peak = peak.clone();
                pool.spawn(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn shutdown_drops_queued_work() {
        let pool = WorkerPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let first = pool.spawn(async move {
            let _ = release_rx.await;
        });
        tokio::task::yield_now().await;

        let counter = ran.clone();
        let queued = pool.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown_now();
        let _ = release_tx.send(());
        first.await.unwrap();
        queued.await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
