//! Bounded-parallelism driver shared by the document and page pools.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Run `handler` over `items` with at most `workers` concurrent tasks.
///
/// Workers pull indexes from a shared cursor until the list is exhausted,
/// so a slow item never blocks the others from being picked up. Completion
/// waits for every task; handlers are infallible by signature, which keeps
/// one item's failure from cancelling its siblings.
pub async fn for_each_concurrent<T, F, Fut>(items: Vec<T>, workers: usize, handler: F)
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if items.is_empty() {
        return;
    }

    let workers = workers.max(1).min(items.len());
    let items = Arc::new(items);
    let cursor = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let items = Arc::clone(&items);
        let cursor = Arc::clone(&cursor);
        let handler = handler.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(index) else {
                    break;
                };
                handler(item.clone()).await;
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("worker task panicked: {e}");
        }
    }
}
