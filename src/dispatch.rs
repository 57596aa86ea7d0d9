//! Dispatch queue
//!
//! All recomputation funnels through one unbounded channel with a single
//! consumer, so derived values are written strictly in the order their
//! triggers arrived and no two computations for the same metric interleave.
//!
//! Suspension drops new tasks at the door and invalidates everything
//! already queued: raising the flag bumps a shared generation counter, and
//! the [`Worker`] discards any task stamped with an older generation, even
//! when it is received only after a resume. Lowering the flag therefore
//! always resumes with an effectively empty queue.

use crate::metric::MetricId;
use crate::store::SeriesId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One unit of work for the consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Task {
    /// Recompute a metric from the store.
    Recompute(MetricId),
    /// A new sample arrived on a source series.
    Sample { series: SeriesId, value: f64 },
}

/// Flag and generation shared by all dispatcher clones and the worker.
#[derive(Debug)]
struct DispatchState {
    suspended: AtomicBool,
    generation: AtomicU64,
}

/// Producer handle. Cheap to clone; all clones share the suspend state.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<(u64, Task)>,
    state: Arc<DispatchState>,
}

/// The single consumer end.
#[derive(Debug)]
pub struct Worker {
    rx: mpsc::UnboundedReceiver<(u64, Task)>,
    state: Arc<DispatchState>,
}

/// Create a dispatch pair.
pub fn channel(start_suspended: bool) -> (Dispatcher, Worker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(DispatchState {
        suspended: AtomicBool::new(start_suspended),
        generation: AtomicU64::new(0),
    });
    (
        Dispatcher {
            tx,
            state: Arc::clone(&state),
        },
        Worker { rx, state },
    )
}

impl Dispatcher {
    /// Queue a task. Returns `false` when the task was dropped, either
    /// because dispatch is suspended or the worker is gone.
    pub fn enqueue(&self, task: Task) -> bool {
        if self.is_suspended() {
            trace!(?task, "dispatch suspended, dropping task");
            return false;
        }
        let generation = self.state.generation.load(Ordering::SeqCst);
        self.tx.send((generation, task)).is_ok()
    }

    /// Raise or lower the suspend flag. Raising it invalidates everything
    /// queued so far.
    pub fn suspend(&self, on: bool) {
        let was = self.state.suspended.swap(on, Ordering::SeqCst);
        if was != on {
            if on {
                self.state.generation.fetch_add(1, Ordering::SeqCst);
            }
            debug!(suspended = on, "dispatch suspend flag changed");
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.state.suspended.load(Ordering::SeqCst)
    }
}

impl Worker {
    /// Receive the next task, discarding anything queued while or before
    /// suspension. `None` once every dispatcher is dropped.
    pub async fn next_task(&mut self) -> Option<Task> {
        loop {
            let (generation, task) = self.rx.recv().await?;
            if self.state.suspended.load(Ordering::SeqCst) {
                trace!(?task, "dispatch suspended, discarding queued task");
                continue;
            }
            if generation < self.state.generation.load(Ordering::SeqCst) {
                trace!(?task, "discarding task queued before suspension");
                continue;
            }
            return Some(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: MetricId = MetricId(0);
    const S: SeriesId = SeriesId(1);

    #[tokio::test]
    async fn tasks_come_out_in_fifo_order() {
        let (tx, mut rx) = channel(false);
        assert!(tx.enqueue(Task::Recompute(M)));
        assert!(tx.enqueue(Task::Sample { series: S, value: 1.0 }));
        assert!(tx.enqueue(Task::Recompute(MetricId(2))));

        assert_eq!(rx.next_task().await, Some(Task::Recompute(M)));
        assert_eq!(
            rx.next_task().await,
            Some(Task::Sample { series: S, value: 1.0 })
        );
        assert_eq!(rx.next_task().await, Some(Task::Recompute(MetricId(2))));
    }

    #[tokio::test]
    async fn suspended_dispatcher_drops_new_tasks() {
        let (tx, mut rx) = channel(false);
        tx.suspend(true);
        assert!(!tx.enqueue(Task::Recompute(M)));
        tx.suspend(false);
        assert!(tx.enqueue(Task::Recompute(M)));
        assert_eq!(rx.next_task().await, Some(Task::Recompute(M)));
    }

    #[tokio::test]
    async fn tasks_in_flight_are_discarded_while_suspended() {
        let (tx, mut rx) = channel(false);
        tx.enqueue(Task::Recompute(MetricId(1)));
        tx.enqueue(Task::Recompute(MetricId(2)));

        // raised after the sends landed: the worker drops both on receipt
        tx.suspend(true);
        drop(tx);
        assert_eq!(rx.next_task().await, None);
    }

    #[tokio::test]
    async fn suspend_then_resume_discards_previously_queued_tasks() {
        let (tx, mut rx) = channel(false);
        tx.enqueue(Task::Recompute(M));
        tx.suspend(true);
        tx.suspend(false);

        // the pre-suspend task is stale; only work queued after the resume
        // reaches the worker
        tx.enqueue(Task::Sample { series: S, value: 2.0 });
        assert_eq!(
            rx.next_task().await,
            Some(Task::Sample { series: S, value: 2.0 })
        );
        drop(tx);
        assert_eq!(rx.next_task().await, None);
    }

    #[tokio::test]
    async fn starts_suspended_when_configured() {
        let (tx, mut rx) = channel(true);
        assert!(tx.is_suspended());
        assert!(!tx.enqueue(Task::Recompute(M)));

        tx.suspend(false);
        tx.enqueue(Task::Recompute(M));
        assert_eq!(rx.next_task().await, Some(Task::Recompute(M)));
    }

    #[tokio::test]
    async fn clones_share_the_suspend_flag() {
        let (tx, _rx) = channel(false);
        let other = tx.clone();
        other.suspend(true);
        assert!(tx.is_suspended());
        assert!(!tx.enqueue(Task::Recompute(M)));
    }

    #[tokio::test]
    async fn closed_channel_ends_the_worker() {
        let (tx, mut rx) = channel(false);
        tx.enqueue(Task::Recompute(M));
        drop(tx);
        assert_eq!(rx.next_task().await, Some(Task::Recompute(M)));
        assert_eq!(rx.next_task().await, None);
    }
}
