//! Bounded reconnection with linear backoff.
//!
//! When a link is lost mid-session the supervisor asks the controller
//! for the first attempt, sleeps for its delay, opens a link to the same
//! remote identifier and reports the outcome. Attempt `n` waits
//! `n * base_delay` before it starts, so with the defaults the attempts
//! begin 2s, 4s, 6s, 8s and 10s after the previous one failed. After
//! `max_attempts` failures the controller gives up. An open that hangs
//! for longer than `open_timeout` is a failure like any other.
//!
//! Every run carries an epoch. Backoff timers are keyed by
//! `(epoch, attempt)`, so success or cancellation only needs to bump the
//! epoch to make every armed timer stale.

use std::time::Duration;

use tracing::{debug, info, warn};

/// Retry limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Attempt `n` waits `n * base_delay`.
    pub base_delay: Duration,
    /// An open that has not resolved after this long counts as a failed
    /// attempt.
    pub open_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            open_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectConfig {
    pub fn validated(mut self) -> Self {
        if self.max_attempts == 0 {
            warn!("max_attempts is 0, using 1");
            self.max_attempts = 1;
        }
        if self.base_delay.is_zero() {
            warn!("base_delay is zero, using 1ms");
            self.base_delay = Duration::from_millis(1);
        }
        if self.open_timeout.is_zero() {
            warn!("open_timeout is zero, using 1ms");
            self.open_timeout = Duration::from_millis(1);
        }
        self
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// The attempt currently scheduled or in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// 1-based attempt number.
    pub count: u32,
    /// How long to wait before this attempt opens a link.
    pub next_delay: Duration,
}

/// What the supervisor should do after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Arm a backoff timer for `delay` and then try again.
    Retry { attempt: u32, delay: Duration },
    /// Budget exhausted. The session is over.
    GiveUp { attempts: u32 },
}

/// Tracks one reconnection run at a time.
#[derive(Debug)]
pub struct ReconnectController {
    config: ReconnectConfig,
    current: Option<ReconnectAttempt>,
    epoch: u64,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config: config.validated(),
            current: None,
            epoch: 0,
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Run generation; timers carrying an older epoch are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn current(&self) -> Option<ReconnectAttempt> {
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Starts a run with attempt 1. Restarting an active run discards
    /// its progress.
    pub fn begin(&mut self) -> ReconnectAttempt {
        if self.current.is_some() {
            debug!("restarting reconnection run");
        }
        self.epoch += 1;
        let attempt = ReconnectAttempt {
            count: 1,
            next_delay: self.config.delay_for(1),
        };
        self.current = Some(attempt);
        info!(delay_ms = attempt.next_delay.as_millis() as u64, "reconnecting");
        attempt
    }

    /// The current attempt failed.
    pub fn on_failure(&mut self) -> ReconnectStep {
        let failed = self.current.map(|a| a.count).unwrap_or(0);
        if failed >= self.config.max_attempts {
            self.current = None;
            self.epoch += 1;
            warn!(attempts = failed, "reconnection exhausted");
            return ReconnectStep::GiveUp { attempts: failed };
        }
        let count = failed + 1;
        let delay = self.config.delay_for(count);
        self.current = Some(ReconnectAttempt {
            count,
            next_delay: delay,
        });
        info!(
            attempt = count,
            max = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect attempt failed, retrying"
        );
        ReconnectStep::Retry {
            attempt: count,
            delay,
        }
    }

    /// A link to the peer is back. Returns the attempt that succeeded,
    /// if a run was active.
    pub fn succeed(&mut self) -> Option<u32> {
        let done = self.current.take().map(|a| a.count);
        if let Some(attempt) = done {
            info!(attempt, "reconnected");
            self.epoch += 1;
        }
        done
    }

    /// Abandons the run without reporting an outcome.
    pub fn cancel(&mut self) {
        if self.current.take().is_some() {
            debug!("reconnection cancelled");
            self.epoch += 1;
        }
    }

    /// Whether a timer armed with `(epoch, attempt)` still belongs to the
    /// live run.
    pub fn is_current(&self, epoch: u64, attempt: u32) -> bool {
        self.epoch == epoch && self.current.is_some_and(|a| a.count == attempt)
    }
}
