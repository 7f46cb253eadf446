//! Serialized task execution.
//!
//! A dedicated worker owns a bounded FIFO; producers enqueue futures and
//! the worker drains them one at a time, so no sync task ever overlaps
//! another. A failing or panicking task is logged at the queue boundary and
//! does not break the chain.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt as _;
use tokio::sync::{mpsc, oneshot};

const QUEUE_CAPACITY: usize = 1024;

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct QueuedTask {
    label: &'static str,
    future: TaskFuture,
}

/// Single-worker FIFO executor. Tasks run strictly in submission order.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<QueuedTask>,
}

impl TaskQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::channel::<QueuedTask>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                match AssertUnwindSafe(task.future).catch_unwind().await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        tracing::warn!(task = task.label, error = %e, "sync task failed");
                    },
                    Err(_) => {
                        tracing::error!(task = task.label, "sync task panicked");
                    },
                }
            }
        });
        Self { tx }
    }

    /// Enqueue a task. Returns `false` (and logs) when the queue is full or
    /// the worker is gone; the periodic full sync re-covers dropped work.
    pub fn submit<F>(&self, label: &'static str, future: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match self.tx.try_send(QueuedTask { label, future: Box::pin(future) }) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(task = label, error = %e, "dropping sync task, queue unavailable");
                false
            },
        }
    }

    /// Resolve once every task submitted before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let submitted = self.submit("flush", async move {
            let _ = done_tx.send(());
            Ok(())
        });
        if submitted {
            let _ = done_rx.await;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn tasks_run_in_submission_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10u32 {
            let order = Arc::clone(&order);
            queue.submit("ordered", async move {
                // Yield so an out-of-order executor would interleave.
                tokio::task::yield_now().await;
                order.lock().push(i);
                Ok(())
            });
        }
        queue.flush().await;

        assert_eq!(*order.lock(), (0..10).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn failing_task_does_not_break_the_chain() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        queue.submit("boom", async { anyhow::bail!("expected failure") });
        let ran_clone = Arc::clone(&ran);
        queue.submit("after", async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        queue.flush().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        queue.submit("panic", async { panic!("expected panic") });
        let ran_clone = Arc::clone(&ran);
        queue.submit("after", async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        queue.flush().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_waits_for_earlier_tasks() {
        let queue = TaskQueue::new();
        let done = Arc::new(AtomicUsize::new(0));

        let done_clone = Arc::clone(&done);
        queue.submit("slow", async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            done_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        queue.flush().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
