//! Operation lifecycle tracking with priority preemption, plus a
//! single-lane priority queue for serializing exclusive work.
//!
//! Cancellation is advisory: preempting an operation flips its status, and
//! the code running it is expected to poll its handle at sensible points
//! and abandon work. Nothing is forcibly aborted.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use txlens_types::{Operation, OperationKind, OperationStatus};

use crate::config::TrackerConfig;
use crate::error::QueueError;

struct OpCell {
    kind: OperationKind,
    priority: u32,
    started_at_ms: u64,
    status: Mutex<OperationStatus>,
}

impl OpCell {
    fn status(&self) -> OperationStatus {
        *self.status.lock().unwrap()
    }

    /// Move to a terminal status; returns false if already terminal.
    fn settle(&self, next: OperationStatus) -> bool {
        let mut status = self.status.lock().unwrap();
        if status.is_terminal() {
            return false;
        }
        *status = next;
        true
    }
}

/// Cloneable view of one tracked operation. The running code holds this and
/// polls [`OperationHandle::is_cancelled`] between mutation steps.
#[derive(Clone)]
pub struct OperationHandle {
    id: String,
    cell: Arc<OpCell>,
}

impl OperationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> OperationStatus {
        self.cell.status()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cell.status() == OperationStatus::Cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.cell.status() == OperationStatus::Pending
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    /// Handed the lane by the previous holder.
    Granted,
    /// Timed out before being granted; skipped when popped.
    Abandoned,
}

struct WaiterCell {
    wake: Notify,
    state: Mutex<WaitState>,
}

struct Waiter {
    priority: u32,
    seq: u64,
    cell: Arc<WaiterCell>,
}

// Max-heap: highest priority first, then earliest arrival.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

#[derive(Default)]
struct QueueState {
    running: bool,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
}

struct TrackerInner {
    config: TrackerConfig,
    epoch: Instant,
    ops: Mutex<HashMap<String, Arc<OpCell>>>,
    queue: Mutex<QueueState>,
}

/// Registry of in-flight operations. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct OperationTracker {
    inner: Arc<TrackerInner>,
}

impl OperationTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                config,
                epoch: Instant::now(),
                ops: Mutex::new(HashMap::new()),
                queue: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Register a new operation. Returns false if an operation with the same
    /// id is already pending, which is how racing duplicates lose.
    ///
    /// Pending operations of the same kind with strictly lower priority are
    /// cancelled; equal priority coexists, and contention between equals is
    /// settled by registration order in [`OperationTracker::queue`].
    pub fn track(&self, id: &str, kind: OperationKind, priority: u32) -> bool {
        let mut ops = self.inner.ops.lock().unwrap();

        if let Some(existing) = ops.get(id) {
            if existing.status() == OperationStatus::Pending {
                debug!(id, "operation already pending, rejecting duplicate");
                return false;
            }
        }

        for (other_id, cell) in ops.iter() {
            if other_id != id
                && cell.kind == kind
                && cell.priority < priority
                && cell.settle(OperationStatus::Cancelled)
            {
                debug!(
                    id = other_id.as_str(),
                    kind = kind.as_str(),
                    "preempted by higher-priority operation"
                );
            }
        }

        let cell = Arc::new(OpCell {
            kind,
            priority,
            started_at_ms: self.inner.epoch.elapsed().as_millis() as u64,
            status: Mutex::new(OperationStatus::Pending),
        });
        ops.insert(id.to_string(), Arc::clone(&cell));
        drop(ops);

        self.spawn_watchdog(id.to_string(), cell);
        true
    }

    /// Settle an operation. Returns false if it is unknown or already
    /// terminal (completing a cancelled operation is a no-op).
    pub fn complete(&self, id: &str, success: bool) -> bool {
        let cell = match self.inner.ops.lock().unwrap().get(id) {
            Some(cell) => Arc::clone(cell),
            None => return false,
        };
        let next = if success {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        cell.settle(next)
    }

    pub fn cancel(&self, id: &str) -> bool {
        let cell = match self.inner.ops.lock().unwrap().get(id) {
            Some(cell) => Arc::clone(cell),
            None => return false,
        };
        cell.settle(OperationStatus::Cancelled)
    }

    pub fn status(&self, id: &str) -> Option<OperationStatus> {
        self.inner
            .ops
            .lock()
            .unwrap()
            .get(id)
            .map(|cell| cell.status())
    }

    pub fn handle(&self, id: &str) -> Option<OperationHandle> {
        self.inner.ops.lock().unwrap().get(id).map(|cell| OperationHandle {
            id: id.to_string(),
            cell: Arc::clone(cell),
        })
    }

    /// Snapshot of one operation's record.
    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.inner.ops.lock().unwrap().get(id).map(|cell| Operation {
            id: id.to_string(),
            kind: cell.kind,
            status: cell.status(),
            priority: cell.priority,
            started_at_ms: cell.started_at_ms,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .ops
            .lock()
            .unwrap()
            .values()
            .filter(|cell| cell.status() == OperationStatus::Pending)
            .count()
    }

    /// Drop terminal records, returning how many were removed.
    pub fn prune_terminal(&self) -> usize {
        let mut ops = self.inner.ops.lock().unwrap();
        let before = ops.len();
        ops.retain(|_, cell| !cell.status().is_terminal());
        before - ops.len()
    }

    /// Run `work` while holding the single exclusive lane. Contending
    /// callers wait in priority order (ties go to the earlier arrival) and
    /// give up with [`QueueError::Timeout`] if `timeout` elapses before the
    /// work finishes.
    pub async fn queue<T>(
        &self,
        id: &str,
        priority: u32,
        timeout: Duration,
        work: impl Future<Output = T>,
    ) -> Result<T, QueueError> {
        let waiting = {
            let mut queue = self.inner.queue.lock().unwrap();
            if !queue.running {
                queue.running = true;
                None
            } else {
                let cell = Arc::new(WaiterCell {
                    wake: Notify::new(),
                    state: Mutex::new(WaitState::Waiting),
                });
                let seq = queue.next_seq;
                queue.next_seq += 1;
                queue.waiters.push(Waiter {
                    priority,
                    seq,
                    cell: Arc::clone(&cell),
                });
                Some(cell)
            }
        };

        let run = async {
            if let Some(cell) = &waiting {
                cell.wake.notified().await;
            }
            work.await
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(value) => {
                self.release_lane();
                Ok(value)
            }
            Err(_) => {
                warn!(id, ?timeout, "queued operation timed out");
                // Release only if we actually held the lane. A waiter that
                // was never granted just marks itself dead in the heap; one
                // granted concurrently with the timeout owns the lane and
                // must pass it on.
                let held = match &waiting {
                    None => true,
                    Some(cell) => {
                        let mut state = cell.state.lock().unwrap();
                        match *state {
                            WaitState::Granted => true,
                            WaitState::Waiting => {
                                *state = WaitState::Abandoned;
                                false
                            }
                            WaitState::Abandoned => false,
                        }
                    }
                };
                if held {
                    self.release_lane();
                }
                Err(QueueError::Timeout {
                    id: id.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Hand the lane to the best live waiter, or mark it free.
    fn release_lane(&self) {
        let mut queue = self.inner.queue.lock().unwrap();
        while let Some(next) = queue.waiters.pop() {
            let mut state = next.cell.state.lock().unwrap();
            if *state == WaitState::Waiting {
                *state = WaitState::Granted;
                drop(state);
                next.cell.wake.notify_one();
                return;
            }
        }
        queue.running = false;
    }

    fn spawn_watchdog(&self, id: String, cell: Arc<OpCell>) {
        let timeout = self.inner.config.operation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if cell.settle(OperationStatus::Failed) {
                warn!(id = id.as_str(), ?timeout, "operation timed out");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracker() -> OperationTracker {
        OperationTracker::new(TrackerConfig::default())
    }

    #[tokio::test]
    async fn duplicate_pending_id_is_rejected() {
        let tracker = tracker();
        assert!(tracker.track("jump_acct_1", OperationKind::Navigation, 5));
        assert!(!tracker.track("jump_acct_1", OperationKind::Navigation, 5));

        // Once settled, the id can be reused.
        assert!(tracker.complete("jump_acct_1", true));
        assert!(tracker.track("jump_acct_1", OperationKind::Navigation, 5));
    }

    #[tokio::test]
    async fn higher_priority_preempts_same_kind() {
        let tracker = tracker();
        tracker.track("nav_low", OperationKind::Navigation, 1);
        tracker.track("fetch_low", OperationKind::DataFetch, 1);

        tracker.track("nav_high", OperationKind::Navigation, 9);

        assert_eq!(tracker.status("nav_low"), Some(OperationStatus::Cancelled));
        // Different kind is untouched.
        assert_eq!(tracker.status("fetch_low"), Some(OperationStatus::Pending));
        assert_eq!(tracker.status("nav_high"), Some(OperationStatus::Pending));
    }

    #[tokio::test]
    async fn equal_priority_coexists() {
        let tracker = tracker();
        tracker.track("nav_a", OperationKind::Navigation, 5);
        tracker.track("nav_b", OperationKind::Navigation, 5);

        assert_eq!(tracker.status("nav_a"), Some(OperationStatus::Pending));
        assert_eq!(tracker.status("nav_b"), Some(OperationStatus::Pending));
        assert_eq!(tracker.pending_count(), 2);
    }

    #[tokio::test]
    async fn cancellation_is_visible_through_handle() {
        let tracker = tracker();
        tracker.track("op", OperationKind::Layout, 3);
        let handle = tracker.handle("op").unwrap();
        assert!(handle.is_pending());

        tracker.cancel("op");
        assert!(handle.is_cancelled());

        // Completing a cancelled operation is a no-op.
        assert!(!tracker.complete("op", true));
        assert_eq!(tracker.status("op"), Some(OperationStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fails_stuck_operations() {
        let tracker = OperationTracker::new(TrackerConfig {
            operation_timeout: Duration::from_secs(30),
        });
        tracker.track("stuck", OperationKind::Render, 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(tracker.status("stuck"), Some(OperationStatus::Pending));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.status("stuck"), Some(OperationStatus::Failed));
    }

    #[tokio::test]
    async fn prune_drops_only_terminal_records() {
        let tracker = tracker();
        tracker.track("done", OperationKind::Navigation, 1);
        tracker.track("live", OperationKind::Navigation, 1);
        tracker.complete("done", true);

        assert_eq!(tracker.prune_terminal(), 1);
        assert!(tracker.status("done").is_none());
        assert_eq!(tracker.status("live"), Some(OperationStatus::Pending));
    }

    #[tokio::test]
    async fn queue_runs_waiters_in_priority_order() {
        let tracker = tracker();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the lane so the next three all contend.
        let gate = Arc::new(Notify::new());
        let holder = {
            let tracker = tracker.clone();
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                tracker
                    .queue("holder", 0, Duration::from_secs(5), async move {
                        gate.notified().await;
                        order.lock().unwrap().push("holder");
                    })
                    .await
                    .unwrap();
            })
        };
        tokio::task::yield_now().await;

        let mut contenders = Vec::new();
        for (id, priority) in [("low", 1u32), ("high", 9), ("mid", 5)] {
            let tracker = tracker.clone();
            let order = Arc::clone(&order);
            contenders.push(tokio::spawn(async move {
                tracker
                    .queue(id, priority, Duration::from_secs(5), async move {
                        order.lock().unwrap().push(id);
                    })
                    .await
                    .unwrap();
            }));
            // Deterministic arrival order.
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        holder.await.unwrap();
        for contender in contenders {
            contender.await.unwrap();
        }

        let order = order.lock().unwrap().clone();
        assert_eq!(order, vec!["holder", "high", "mid", "low"]);
    }

    #[tokio::test]
    async fn queue_breaks_priority_ties_by_arrival() {
        let tracker = tracker();
        let order = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());

        let holder = {
            let tracker = tracker.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                tracker
                    .queue("holder", 0, Duration::from_secs(5), async move {
                        gate.notified().await;
                    })
                    .await
                    .unwrap();
            })
        };
        tokio::task::yield_now().await;

        let mut contenders = Vec::new();
        for id in ["first", "second", "third"] {
            let tracker = tracker.clone();
            let order = Arc::clone(&order);
            contenders.push(tokio::spawn(async move {
                tracker
                    .queue(id, 5, Duration::from_secs(5), async move {
                        order.lock().unwrap().push(id);
                    })
                    .await
                    .unwrap();
            }));
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        holder.await.unwrap();
        for contender in contenders {
            contender.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_times_out_while_waiting() {
        let tracker = tracker();
        let gate = Arc::new(Notify::new());

        let holder = {
            let tracker = tracker.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                tracker
                    .queue("holder", 0, Duration::from_secs(3600), async move {
                        gate.notified().await;
                    })
                    .await
                    .unwrap();
            })
        };
        tokio::task::yield_now().await;

        let result = tracker
            .queue("hopeful", 5, Duration::from_millis(100), async { "never" })
            .await;
        match result {
            Err(QueueError::Timeout { id, timeout }) => {
                assert_eq!(id, "hopeful");
                assert_eq!(timeout, Duration::from_millis(100));
            }
            Ok(_) => panic!("expected queue timeout"),
        }

        // The lane still works afterwards.
        gate.notify_one();
        holder.await.unwrap();
        let value = tracker
            .queue("after", 1, Duration::from_secs(5), async { 42 })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
