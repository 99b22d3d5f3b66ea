//! Fixed-size worker pool over a seeded queue.
//!
//! Items are queued in order on a bounded channel before any worker starts. Each of the `N`
//! workers pulls the next item until the queue is drained, so with one worker the execution
//! order equals the seed order. The first error cancels the shared token: workers stop
//! pulling, and in-flight work observes the token at its next checkpoint.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::ReelError;

/// A failed work item, with whatever it produced before failing.
#[derive(Debug)]
pub struct WorkFailure<R> {
    pub partial: Option<R>,
    pub error: ReelError,
}

impl<R> WorkFailure<R> {
    pub fn with_partial(partial: R, error: ReelError) -> Self {
        Self {
            partial: Some(partial),
            error,
        }
    }
}

impl<R> From<ReelError> for WorkFailure<R> {
    fn from(error: ReelError) -> Self {
        Self {
            partial: None,
            error,
        }
    }
}

/// What a pool run produced.
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// Successful results, sorted by item index.
    pub completed: Vec<(usize, R)>,
    /// The first failure, with the index of the item that raised it.
    pub error: Option<(usize, ReelError)>,
    /// Items that failed after the run was already halting, sorted by index.
    pub interrupted: Vec<usize>,
    /// Partial results of every failed item, sorted by item index.
    pub partial: Vec<(usize, R)>,
    /// Items never started because the run was cancelled.
    pub skipped: Vec<usize>,
}

impl<R> PoolOutcome<R> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct WorkerLog<R> {
    done: Vec<(usize, R)>,
    partial: Vec<(usize, R)>,
    interrupted: Vec<usize>,
}

pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, workers: usize, work: F) -> PoolOutcome<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, WorkFailure<R>>> + Send + 'static,
{
    let n = items.len();
    let (tx, rx) = mpsc::channel(n.max(1));
    for (i, item) in items.into_iter().enumerate() {
        // Capacity covers every item and the receiver is alive, so this cannot fail.
        let _ = tx.try_send((i, item));
    }
    drop(tx);

    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let cancel = CancellationToken::new();
    let first_error: Arc<Mutex<Option<(usize, ReelError)>>> = Arc::new(Mutex::new(None));
    let work = Arc::new(work);

    let mut set = JoinSet::new();
    for worker in 0..workers.clamp(1, n.max(1)) {
        let rx = rx.clone();
        let cancel = cancel.clone();
        let first_error = first_error.clone();
        let work = work.clone();
        set.spawn(async move {
            let mut log = WorkerLog {
                done: Vec::new(),
                partial: Vec::new(),
                interrupted: Vec::new(),
            };
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = rx.lock().await.recv().await;
                let Some((i, item)) = next else { break };
                tracing::debug!(worker, item = i, "work item started");
                match (*work)(i, item, cancel.clone()).await {
                    Ok(r) => log.done.push((i, r)),
                    Err(WorkFailure { partial, error }) => {
                        if let Some(p) = partial {
                            log.partial.push((i, p));
                        }
                        let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
                        if slot.is_none() {
                            tracing::warn!(worker, item = i, error = %error, "work item failed");
                            *slot = Some((i, error));
                        } else {
                            tracing::debug!(worker, item = i, error = %error, "work item interrupted");
                            log.interrupted.push(i);
                        }
                        cancel.cancel();
                        break;
                    }
                }
            }
            log
        });
    }

    let mut completed = Vec::with_capacity(n);
    let mut partial = Vec::new();
    let mut interrupted = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(log) => {
                completed.extend(log.done);
                partial.extend(log.partial);
                interrupted.extend(log.interrupted);
            }
            Err(e) => {
                let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
                if slot.is_none() {
                    let err = ReelError::Other(anyhow::anyhow!("worker panicked: {e}"));
                    *slot = Some((usize::MAX, err));
                }
            }
        }
    }
    completed.sort_by_key(|(i, _)| *i);
    partial.sort_by_key(|(i, _)| *i);
    interrupted.sort_unstable();

    let mut skipped = Vec::new();
    {
        let mut rx = rx.lock().await;
        while let Ok((i, _)) = rx.try_recv() {
            skipped.push(i);
        }
    }

    let error = first_error.lock().unwrap_or_else(|p| p.into_inner()).take();
    PoolOutcome {
        completed,
        error,
        interrupted,
        partial,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_come_back_in_item_order() {
        let out = run_bounded((0..10).collect(), 3, |_, x: u32, _| async move {
            tokio::task::yield_now().await;
            Ok(x * 2)
        })
        .await;
        assert!(out.is_success());
        let values: Vec<u32> = out.completed.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, (0..10).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let out = run_bounded(vec![(); 12], 2, move |_, _, _| {
            let (a, p) = (a.clone(), p.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert_eq!(out.completed.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_worker_stops_at_first_error() {
        let out = run_bounded((0..5).collect(), 1, |i, _: u32, _| async move {
            if i == 2 {
                Err(WorkFailure::from(ReelError::provider("quota exceeded")))
            } else {
                Ok(i)
            }
        })
        .await;
        assert_eq!(
            out.completed.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(matches!(out.error, Some((2, ReelError::Provider(_)))));
        assert_eq!(out.skipped, vec![3, 4]);
        assert!(out.interrupted.is_empty() && out.partial.is_empty());
    }

    #[tokio::test]
    async fn work_cut_short_by_cancellation_is_reported_with_its_partial() {
        let (started_tx, started_rx) = tokio::sync::watch::channel(false);
        let started_tx = Arc::new(started_tx);
        let out = run_bounded(vec![0u32, 1], 2, move |i, _, cancel| {
            let started_tx = started_tx.clone();
            let mut started_rx = started_rx.clone();
            async move {
                if i == 0 {
                    let _ = started_rx.wait_for(|s| *s).await;
                    return Err(WorkFailure::with_partial(10, ReelError::provider("boom")));
                }
                let _ = started_tx.send(true);
                cancel.cancelled().await;
                Err(WorkFailure::with_partial(11, ReelError::provider("cancelled")))
            }
        })
        .await;
        assert!(matches!(out.error, Some((0, ReelError::Provider(_)))));
        assert_eq!(out.interrupted, vec![1]);
        assert_eq!(out.partial, vec![(0, 10), (1, 11)]);
        assert!(out.completed.is_empty() && out.skipped.is_empty());
    }

    #[tokio::test]
    async fn empty_queue_finishes_immediately() {
        let out = run_bounded(Vec::<u8>::new(), 4, |_, x, _| async move { Ok(x) }).await;
        assert!(out.completed.is_empty() && out.skipped.is_empty() && out.is_success());
    }
}
