//! Liveness-confirmed round reset.
//!
//! The initiator sends `reset-ping` and waits up to
//! [`ResetConfig::confirm_within`] for `reset-pong`. Only the pong clears
//! its round, so a reset is never applied locally against a peer that
//! cannot confirm it. The responder side has no state: it always answers
//! and resets immediately.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetConfig {
    /// How long the initiator waits for `reset-pong`.
    pub confirm_within: Duration,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            confirm_within: Duration::from_secs(2),
        }
    }
}

impl ResetConfig {
    pub fn validated(mut self) -> Self {
        if self.confirm_within.is_zero() {
            warn!("confirm_within is zero, using 1ms");
            self.confirm_within = Duration::from_millis(1);
        }
        self
    }
}

/// An outstanding `reset-ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReset {
    /// Carried in the deadline timer key.
    pub token: u64,
    pub deadline: Instant,
}

/// Initiator side of the reset handshake.
#[derive(Debug)]
pub struct ResetHandshake {
    config: ResetConfig,
    pending: Option<PendingReset>,
    next_token: u64,
}

impl ResetHandshake {
    pub fn new(config: ResetConfig) -> Self {
        Self {
            config: config.validated(),
            pending: None,
            next_token: 0,
        }
    }

    pub fn config(&self) -> &ResetConfig {
        &self.config
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingReset> {
        self.pending
    }

    /// Opens a handshake. The caller sends `reset-ping` and arms a timer
    /// for the returned deadline.
    pub fn initiate(&mut self, now: Instant) -> Result<PendingReset, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::ResetPending);
        }
        let pending = PendingReset {
            token: self.next_token,
            deadline: now + self.config.confirm_within,
        };
        self.next_token += 1;
        self.pending = Some(pending);
        debug!(token = pending.token, "reset requested");
        Ok(pending)
    }

    /// `reset-pong` arrived. Returns the handshake it confirms, or `None`
    /// if nothing was pending (a late or duplicate pong).
    pub fn on_reset_pong(&mut self) -> Option<PendingReset> {
        let confirmed = self.pending.take();
        match confirmed {
            Some(p) => info!(token = p.token, "reset confirmed by peer"),
            None => debug!("unsolicited reset-pong ignored"),
        }
        confirmed
    }

    /// The deadline timer for `token` fired. Returns `true` if that
    /// handshake was still pending and has now failed.
    pub fn on_deadline(&mut self, token: u64) -> bool {
        match self.pending {
            Some(p) if p.token == token => {
                self.pending = None;
                warn!(token, "reset not confirmed in time");
                true
            }
            _ => false,
        }
    }

    /// Drops any pending handshake, e.g. when the link goes away.
    pub fn abandon(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_initiate_sets_deadline() {
        let mut rh = ResetHandshake::new(ResetConfig::default());
        let now = Instant::now();
        let p = rh.initiate(now).unwrap();
        assert_eq!(p.deadline, now + Duration::from_secs(2));
        assert!(rh.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_initiate_is_refused_while_pending() {
        let mut rh = ResetHandshake::new(ResetConfig::default());
        rh.initiate(Instant::now()).unwrap();
        assert_eq!(
            rh.initiate(Instant::now()).unwrap_err(),
            SessionError::ResetPending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_confirms_and_stales_the_deadline() {
        let mut rh = ResetHandshake::new(ResetConfig::default());
        let p = rh.initiate(Instant::now()).unwrap();
        assert_eq!(rh.on_reset_pong(), Some(p));
        assert!(!rh.on_deadline(p.token));
        assert_eq!(rh.on_reset_pong(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_only_its_own_handshake() {
        let mut rh = ResetHandshake::new(ResetConfig::default());
        let first = rh.initiate(Instant::now()).unwrap();
        rh.on_reset_pong();
        let second = rh.initiate(Instant::now()).unwrap();
        assert_ne!(first.token, second.token);

        assert!(!rh.on_deadline(first.token));
        assert!(rh.is_pending());
        assert!(rh.on_deadline(second.token));
        assert!(!rh.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_clears_pending() {
        let mut rh = ResetHandshake::new(ResetConfig::default());
        let p = rh.initiate(Instant::now()).unwrap();
        rh.abandon();
        assert!(!rh.on_deadline(p.token));
        assert!(rh.initiate(Instant::now()).is_ok());
    }
}
