//! Integration tests for the timer queue.
//!
//! Uses `tokio::time::pause()` to control time deterministically.
//! All tests run with auto-advanced time so `sleep_until` resolves
//! instantly once nothing else is runnable.

use std::time::Duration;

use duel_timer::TimerQueue;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Probe { link: u64 },
    Unstable { link: u64 },
    Offline { link: u64 },
}

impl Key {
    fn link(self) -> u64 {
        match self {
            Key::Probe { link } | Key::Unstable { link } | Key::Offline { link } => link,
        }
    }
}

// =========================================================================
// Firing order
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_fires_in_deadline_order() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_secs(10), Key::Offline { link: 1 });
    q.schedule(Duration::from_secs(2), Key::Unstable { link: 1 });
    q.schedule(Duration::from_secs(5), Key::Probe { link: 1 });

    let start = Instant::now();
    let a = q.wait_next().await;
    assert_eq!(a.key, Key::Unstable { link: 1 });
    assert_eq!(a.deadline - start, Duration::from_secs(2));

    assert_eq!(q.wait_next().await.key, Key::Probe { link: 1 });
    assert_eq!(q.wait_next().await.key, Key::Offline { link: 1 });
    assert!(q.is_empty());
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_equal_deadlines_fire_in_scheduling_order() {
    let mut q = TimerQueue::new();
    let at = Instant::now() + Duration::from_secs(1);
    q.schedule_at(at, "first");
    q.schedule_at(at, "second");
    q.schedule_at(at, "third");

    assert_eq!(q.wait_next().await.key, "first");
    assert_eq!(q.wait_next().await.key, "second");
    assert_eq!(q.wait_next().await.key, "third");
}

#[tokio::test(start_paused = true)]
async fn test_fired_entry_reports_no_lateness_on_virtual_time() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_millis(1500), ());
    let fired = q.wait_next().await;
    assert_eq!(fired.late_by, Duration::ZERO);
}

// =========================================================================
// Empty queue pends forever
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_queue_never_fires() {
    let mut q: TimerQueue<Key> = TimerQueue::new();
    let result = tokio::time::timeout(Duration::from_secs(60), q.wait_next()).await;
    assert!(result.is_err(), "empty queue should pend forever");
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_does_not_fire() {
    let mut q = TimerQueue::new();
    let unstable = q.schedule(Duration::from_secs(2), Key::Unstable { link: 1 });
    q.schedule(Duration::from_secs(10), Key::Offline { link: 1 });

    assert_eq!(q.cancel(unstable), Some(Key::Unstable { link: 1 }));

    let fired = q.wait_next().await;
    assert_eq!(fired.key, Key::Offline { link: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_retain_purges_superseded_generation() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_secs(2), Key::Unstable { link: 1 });
    q.schedule(Duration::from_secs(4), Key::Offline { link: 1 });
    q.schedule(Duration::from_secs(5), Key::Probe { link: 2 });

    let removed = q.retain(|k| k.link() == 2);
    assert_eq!(removed, 2);
    assert_eq!(q.len(), 1);
    assert_eq!(q.keys().copied().collect::<Vec<_>>(), vec![Key::Probe { link: 2 }]);
    assert_eq!(q.wait_next().await.key, Key::Probe { link: 2 });
}

#[tokio::test(start_paused = true)]
async fn test_clear_cancels_everything() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_secs(1), 1);
    q.schedule(Duration::from_secs(2), 2);
    q.clear();
    assert!(q.is_empty());
    let result = tokio::time::timeout(Duration::from_secs(5), q.wait_next()).await;
    assert!(result.is_err());
}

// =========================================================================
// Cancel safety inside select!
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_losing_select_race_keeps_timer() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_secs(5), "late");

    // A faster branch wins; the queue future is dropped mid-sleep.
    tokio::select! {
        _ = q.wait_next() => panic!("timer should not win"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }

    assert_eq!(q.len(), 1, "dropped wait must not consume the entry");
    let fired = q.wait_next().await;
    assert_eq!(fired.key, "late");
}

#[tokio::test(start_paused = true)]
async fn test_schedule_after_wait_picks_up_new_earliest() {
    let mut q = TimerQueue::new();
    q.schedule(Duration::from_secs(10), "slow");

    tokio::select! {
        _ = q.wait_next() => panic!("should be interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }
    q.schedule(Duration::from_secs(1), "fast");

    assert_eq!(q.wait_next().await.key, "fast");
    assert_eq!(q.wait_next().await.key, "slow");
}
