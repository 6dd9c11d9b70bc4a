use crate::{FillError, FillResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Bounded set of worker tasks shared by one reconciler.
///
/// `run` waits for a free slot, executes the unit on its own task, and
/// returns its output once it completes.
#[derive(Debug, Clone)]
pub struct WorkPool {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl WorkPool {
    pub fn new(name: &'static str, parallelism: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, work: F) -> FillResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FillError::PoolClosed)?;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });
        handle.await.map_err(|e| {
            warn!(pool = self.name, error = %e, "Worker task failed");
            FillError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_output() {
        let pool = WorkPool::new("test", 2);
        let value = pool.run(async { 40 + 2 }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let pool = WorkPool::new("test", 2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                pool.run(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_unit_is_reported() {
        let pool = WorkPool::new("test", 1);
        let result = pool.run(async { panic!("boom") }).await;
        assert!(matches!(result, Err(FillError::Worker(_))));
        assert_eq!(pool.available(), 1);
    }
}
