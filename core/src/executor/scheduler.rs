use std::future::Future;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Execute one dependency level concurrently.
///
/// At most `max_concurrency` futures run at once; the rest wait for a permit
/// rather than failing. Returns once every step in the level has finished,
/// in completion order.
///
/// # Arguments
///
/// * `step_ids` - Steps of this level
/// * `max_concurrency` - Maximum number of concurrent steps
/// * `executor_fn` - Async function executing a single step
pub async fn execute_level<F, Fut, T>(
    step_ids: &[String],
    max_concurrency: usize,
    executor_fn: F,
) -> Vec<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T>,
{
    let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for id in step_ids {
        let sem = sem.clone();
        let fut = executor_fn(id.clone());

        futs.push(async move {
            // The semaphore is never closed, so a permit always arrives.
            let _permit = sem.acquire_owned().await.ok();
            fut.await
        });
    }

    let mut results = Vec::with_capacity(step_ids.len());
    while let Some(res) = futs.next().await {
        results.push(res);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_is_bounded_and_excess_queues() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let ids: Vec<String> = (0..5).map(|i| format!("s{i}")).collect();

        let done = execute_level(&ids, 2, |id| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                id
            }
        })
        .await;

        assert_eq!(done.len(), 5);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
