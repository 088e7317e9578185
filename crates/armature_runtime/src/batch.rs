//! Bounded concurrent gathering.
//!
//! [`gather_bounded`] runs one future per item with at most `limit` in
//! flight. A failing item never cancels its siblings; every result is
//! collected and partitioned in input order.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Partitioned results of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<K, T, E> {
    /// Items that succeeded, with their values
    pub succeeded: Vec<(K, T)>,
    /// Items that failed, with their errors
    pub failed: Vec<(K, E)>,
}

impl<K, T, E> BatchOutcome<K, T, E> {
    /// Total items processed
    #[must_use]
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether the batch was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every item succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `f` over `items` with at most `limit` calls in flight
///
/// A `limit` of zero is treated as one.
pub async fn gather_bounded<K, T, E, F, Fut>(
    items: Vec<K>,
    limit: usize,
    f: F,
) -> BatchOutcome<K, T, E>
where
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let calls = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        let call = f(item.clone());
        async move {
            // The semaphore is never closed, so acquire cannot fail
            let _permit = semaphore.acquire().await.ok();
            (item, call.await)
        }
    });

    let mut outcome = BatchOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (item, result) in join_all(calls).await {
        match result {
            Ok(value) => outcome.succeeded.push((item, value)),
            Err(err) => outcome.failed.push((item, err)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_partial_failure_keeps_siblings() {
        let outcome = gather_bounded(vec![1, 2, 3, 4], 2, |n| async move {
            if n % 2 == 0 { Ok(n * 10) } else { Err(format!("odd {}", n)) }
        })
        .await;

        assert_eq!(outcome.succeeded, vec![(2, 20), (4, 40)]);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].0, 1);
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.len(), 4);
    }

    #[tokio::test]
    async fn test_limit_caps_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = gather_bounded((0..10).collect(), 3, |_| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            }
        })
        .await;

        assert!(outcome.all_succeeded());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = gather_bounded(Vec::<u8>::new(), 0, |n| async move { Ok::<_, ()>(n) }).await;
        assert!(outcome.is_empty());
    }
}
