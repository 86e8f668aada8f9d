//! One-shot timer queue for duel supervisors.
//!
//! Every suspension point of a session (probe interval, unstable and
//! offline thresholds, reset deadline, reconnect backoff, countdown ticks)
//! is a one-shot timer carrying a caller-defined key. The supervisor owns a
//! single [`TimerQueue`] and drains it from its control loop.
//!
//! # Integration
//!
//! The queue is designed to sit inside an actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = timers.wait_next() => { /* handle fired.key */ }
//!     }
//! }
//! ```
//!
//! [`TimerQueue::wait_next`] is cancel-safe: an entry is removed only after
//! its deadline has passed and the future is polled to completion, so
//! losing a `select!` race never drops a timer. With no entries scheduled
//! it pends forever.
//!
//! # Stale timers
//!
//! The queue does not know what a key means. Callers embed a generation
//! (for example, the link instance a probe belongs to) in the key and
//! ignore firings whose generation is no longer current. [`TimerQueue::retain`]
//! can also purge a superseded generation eagerly.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{trace, warn};

/// Firings later than this are logged as overruns.
const OVERRUN_WARN: Duration = Duration::from_millis(250);

/// Handle to a scheduled timer, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId {
    deadline: Instant,
    seq: u64,
}

impl TimerId {
    /// When the timer is due.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// A timer that has come due, returned by [`TimerQueue::wait_next`].
#[derive(Debug, Clone)]
pub struct Fired<K> {
    /// The key it was scheduled with.
    pub key: K,
    /// The deadline it was scheduled for.
    pub deadline: Instant,
    /// How far past the deadline it was actually delivered.
    pub late_by: Duration,
}

/// Ordered set of pending one-shot timers.
///
/// Entries with equal deadlines fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<K> {
    entries: BTreeMap<TimerId, K>,
    next_seq: u64,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TimerQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `key` to fire after `delay`.
    pub fn schedule(&mut self, delay: Duration, key: K) -> TimerId {
        self.schedule_at(Instant::now() + delay, key)
    }

    /// Schedules `key` to fire at `deadline`.
    pub fn schedule_at(&mut self, deadline: Instant, key: K) -> TimerId {
        let id = TimerId {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(id, key);
        id
    }

    /// Cancels a pending timer. Returns its key, or `None` if it already
    /// fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> Option<K> {
        self.entries.remove(&id)
    }

    /// Keeps only the timers whose key satisfies `keep`. Returns how many
    /// were cancelled.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, key| keep(key));
        before - self.entries.len()
    }

    /// Whether `id` is still pending.
    pub fn contains(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(TimerId::deadline)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over pending keys in firing order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.values()
    }

    /// Waits for the earliest timer to come due and removes it.
    ///
    /// Pends forever while the queue is empty. `tokio::select!` will
    /// still process other branches.
    pub async fn wait_next(&mut self) -> Fired<K> {
        let Some(deadline) = self.next_deadline() else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;

        // `&mut self` is held across the sleep, so the first entry is
        // still the one we slept for.
        let (id, key) = match self.entries.pop_first() {
            Some(entry) => entry,
            None => unreachable!("queue emptied while borrowed"),
        };

        let late_by = Instant::now().saturating_duration_since(id.deadline);
        if late_by > OVERRUN_WARN {
            warn!(
                late_ms = late_by.as_secs_f64() * 1000.0,
                "timer fired late"
            );
        } else {
            trace!(seq = id.seq, "timer fired");
        }

        Fired {
            key,
            deadline: id.deadline,
            late_by,
        }
    }
}
