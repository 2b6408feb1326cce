// Trigger timer - cancellable "run this at time T" primitive
// A priority queue of (time, action) pairs drained against the clock by a
// dedicated pump thread. Schedulers never sleep; waiting is expressed as
// registered triggers.

use crate::audio::clock::ClockSource;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Unique identifier for registered triggers
pub type TriggerId = u64;

/// Ownership token for one registered trigger.
///
/// Held exclusively by the scheduler that registered it and used only to
/// cancel. Deliberately not `Clone`: exactly one owner per trigger.
#[derive(Debug)]
pub struct TriggerHandle {
    id: TriggerId,
}

impl TriggerHandle {
    pub fn id(&self) -> TriggerId {
        self.id
    }
}

type TriggerFn = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTrigger {
    id: TriggerId,
    at: f64,
    action: TriggerFn,
}

// Min-heap on (time, id): earlier triggers are "greater" in priority, and
// equal times fire in registration order.
impl Ord for QueuedTrigger {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedTrigger {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTrigger {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueuedTrigger {}

struct TimerInner {
    queue: BinaryHeap<QueuedTrigger>,
    /// Ids still eligible to fire. Cancellation removes the id here and
    /// leaves the heap entry to be discarded lazily on drain.
    live: HashSet<TriggerId>,
}

/// Registers actions to run at clock times and drains them in time order.
pub struct TriggerTimer {
    inner: Mutex<TimerInner>,
    next_id: AtomicU64,
}

impl TriggerTimer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TimerInner {
                queue: BinaryHeap::new(),
                live: HashSet::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `action` to run at clock time `at` (seconds)
    pub fn schedule(&self, at: f64, action: impl FnOnce() + Send + 'static) -> TriggerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        inner.live.insert(id);
        inner.queue.push(QueuedTrigger {
            id,
            at,
            action: Box::new(action),
        });
        TriggerHandle { id }
    }

    /// Cancel a registered trigger. Idempotent: cancelling a handle whose
    /// trigger already fired (or was already cancelled) returns false and
    /// is not an error.
    pub fn cancel(&self, handle: &TriggerHandle) -> bool {
        self.inner.lock().unwrap().live.remove(&handle.id)
    }

    /// Cancel and drop a whole set of handles
    pub fn cancel_batch(&self, handles: impl IntoIterator<Item = TriggerHandle>) {
        let mut inner = self.inner.lock().unwrap();
        for handle in handles {
            inner.live.remove(&handle.id);
        }
    }

    /// Discard every registered trigger (engine teardown only — this also
    /// kills triggers owned by other schedulers sharing the timer)
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.live.clear();
    }

    /// Number of live (not fired, not cancelled) triggers
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    /// Fire every live trigger with `at <= now`, in non-decreasing
    /// (time, id) order. Returns the number fired.
    ///
    /// The lock is released while each action runs, so actions may register
    /// further triggers; a newly registered trigger that is itself due is
    /// picked up by the same drain. An overdue backlog (delayed pump or
    /// re-arm tick) is therefore caught up in order, never dropped.
    pub fn fire_due(&self, now: f64) -> usize {
        let mut fired = 0;
        loop {
            let action = {
                let mut inner = self.inner.lock().unwrap();
                loop {
                    if inner.queue.peek().map_or(true, |top| top.at > now) {
                        break None;
                    }
                    let trigger = inner.queue.pop().unwrap();
                    if inner.live.remove(&trigger.id) {
                        break Some(trigger.action);
                    }
                    // Cancelled: discard and keep scanning
                }
            };

            match action {
                Some(action) => {
                    action();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }
}

impl Default for TriggerTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Dedicated thread draining a [`TriggerTimer`] against a clock.
///
/// Runs at a short fixed period and fires triggers due within `horizon`
/// seconds ahead, handing the audio sink enough headroom to place each
/// sound at its exact sample.
pub struct TriggerPump {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TriggerPump {
    pub fn start(
        timer: Arc<TriggerTimer>,
        clock: Arc<dyn ClockSource>,
        period: Duration,
        horizon: f64,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while running_flag.load(Ordering::SeqCst) {
                timer.fire_due(clock.now() + horizon);
                thread::sleep(period);
            }
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TriggerPump {
    fn drop(&mut self) {
        self.stop();
    }
}
