//! The per-round state owned by the supervisor.

use duel_protocol::Choice;
use tracing::{debug, info};

use crate::{Phase, RoundConfig, RoundError, Winner, resolve};

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; the remaining value is shown.
    Continue(u32),
    /// Reached zero and entered `Playing`.
    Done,
}

/// What recording the peer's choice did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChoice {
    /// Stored; the local choice is still missing.
    Recorded,
    /// Stored and the round resolved.
    Resolved(Winner),
    /// Same value as already held (a resync after reconnection).
    Duplicate,
    /// A different value than already held. The first one is kept.
    Conflict { kept: Choice, ignored: Choice },
}

/// Phase, choices, winner and countdown for the current round.
///
/// Invariant: `winner` is set if and only if both choices are set, and
/// once it is set the phase is `Result`.
#[derive(Debug, Clone)]
pub struct RoundState {
    config: RoundConfig,
    phase: Phase,
    local_choice: Option<Choice>,
    remote_choice: Option<Choice>,
    winner: Option<Winner>,
    countdown: u32,
    /// Bumped every time the round is recreated, so countdown ticks
    /// scheduled for an earlier round can be recognised.
    epoch: u64,
}

impl RoundState {
    /// A fresh state in `Idle`.
    pub fn new(config: RoundConfig) -> Self {
        let config = config.validated();
        Self {
            countdown: config.countdown_ticks,
            config,
            phase: Phase::Idle,
            local_choice: None,
            remote_choice: None,
            winner: None,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn local_choice(&self) -> Option<Choice> {
        self.local_choice
    }

    pub fn remote_choice(&self) -> Option<Choice> {
        self.remote_choice
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// `Idle → RoomSetup`.
    pub fn host(&mut self) -> Result<(), RoundError> {
        self.require(Phase::Idle, "host a room")?;
        self.set_phase(Phase::RoomSetup);
        Ok(())
    }

    /// `Idle → Joining`.
    pub fn join(&mut self) -> Result<(), RoundError> {
        self.require(Phase::Idle, "join a room")?;
        self.set_phase(Phase::Joining);
        Ok(())
    }

    /// `RoomSetup | Joining → Connected`.
    pub fn link_established(&mut self) -> Result<(), RoundError> {
        if !self.phase.is_awaiting_link() {
            return Err(self.invalid("complete a connection"));
        }
        self.set_phase(Phase::Connected);
        Ok(())
    }

    /// `Connected → Countdown`. Returns the starting countdown value.
    ///
    /// A choice the peer already sent (it may have started earlier) is
    /// kept.
    pub fn start_countdown(&mut self) -> Result<u32, RoundError> {
        self.require(Phase::Connected, "start a round")?;
        self.countdown = self.config.countdown_ticks;
        self.set_phase(Phase::Countdown);
        Ok(self.countdown)
    }

    /// Advances the countdown. Returns `None` if the tick belongs to an
    /// earlier round or the countdown is not running.
    pub fn tick(&mut self, epoch: u64) -> Option<Tick> {
        if epoch != self.epoch || self.phase != Phase::Countdown {
            debug!(epoch, current = self.epoch, phase = %self.phase, "ignoring stale countdown tick");
            return None;
        }
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.set_phase(Phase::Playing);
            Some(Tick::Done)
        } else {
            Some(Tick::Continue(self.countdown))
        }
    }

    /// Commits the local choice. Returns the winner if the peer's choice
    /// was already known.
    pub fn select(&mut self, choice: Choice) -> Result<Option<Winner>, RoundError> {
        self.require(Phase::Playing, "choose")?;
        if let Some(existing) = self.local_choice {
            return Err(RoundError::AlreadyChosen(existing));
        }
        self.local_choice = Some(choice);
        Ok(self.try_resolve())
    }

    /// Records the peer's choice, whatever the local phase.
    pub fn record_remote(&mut self, choice: Choice) -> RemoteChoice {
        match self.remote_choice {
            Some(kept) if kept == choice => RemoteChoice::Duplicate,
            Some(kept) => RemoteChoice::Conflict {
                kept,
                ignored: choice,
            },
            None => {
                self.remote_choice = Some(choice);
                match self.try_resolve() {
                    Some(winner) => RemoteChoice::Resolved(winner),
                    None => RemoteChoice::Recorded,
                }
            }
        }
    }

    /// Starts a fresh round in `Connected`: choices and winner cleared,
    /// countdown back to its initial value.
    pub fn reset(&mut self) -> Result<(), RoundError> {
        if !self.phase.is_in_session() {
            return Err(self.invalid("reset the round"));
        }
        self.clear();
        self.set_phase(Phase::Connected);
        Ok(())
    }

    /// Drops everything and returns to `Idle`.
    pub fn abort(&mut self) {
        self.clear();
        if self.phase != Phase::Idle {
            self.set_phase(Phase::Idle);
        }
    }

    fn clear(&mut self) {
        self.local_choice = None;
        self.remote_choice = None;
        self.winner = None;
        self.countdown = self.config.countdown_ticks;
        self.epoch += 1;
    }

    fn try_resolve(&mut self) -> Option<Winner> {
        let (Some(local), Some(remote)) = (self.local_choice, self.remote_choice) else {
            return None;
        };
        let winner = resolve(local, remote);
        self.winner = Some(winner);
        self.set_phase(Phase::Result);
        info!(%local, %remote, ?winner, "round resolved");
        Some(winner)
    }

    fn require(&self, phase: Phase, action: &'static str) -> Result<(), RoundError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> RoundError {
        RoundError::InvalidPhase {
            action,
            phase: self.phase,
        }
    }

    fn set_phase(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        info!(from = %self.phase, to = %next, "phase changed");
        self.phase = next;
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new(RoundConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> RoundState {
        let mut r = RoundState::default();
        r.host().unwrap();
        r.link_established().unwrap();
        r
    }

    fn playing() -> RoundState {
        let mut r = connected();
        r.start_countdown().unwrap();
        let epoch = r.epoch();
        while r.tick(epoch) != Some(Tick::Done) {}
        r
    }

    #[test]
    fn test_new_round_is_idle_and_empty() {
        let r = RoundState::default();
        assert_eq!(r.phase(), Phase::Idle);
        assert_eq!(r.local_choice(), None);
        assert_eq!(r.remote_choice(), None);
        assert_eq!(r.winner(), None);
        assert_eq!(r.countdown(), 3);
    }

    #[test]
    fn test_host_and_join_only_from_idle() {
        let mut r = RoundState::default();
        r.join().unwrap();
        assert_eq!(r.phase(), Phase::Joining);
        assert!(matches!(
            r.host(),
            Err(RoundError::InvalidPhase { phase: Phase::Joining, .. })
        ));
    }

    #[test]
    fn test_link_established_requires_pending_link() {
        let mut r = RoundState::default();
        assert!(r.link_established().is_err());
        r.host().unwrap();
        r.link_established().unwrap();
        assert_eq!(r.phase(), Phase::Connected);
    }

    #[test]
    fn test_countdown_ticks_down_to_playing() {
        let mut r = connected();
        assert_eq!(r.start_countdown().unwrap(), 3);
        let epoch = r.epoch();
        assert_eq!(r.tick(epoch), Some(Tick::Continue(2)));
        assert_eq!(r.tick(epoch), Some(Tick::Continue(1)));
        assert_eq!(r.tick(epoch), Some(Tick::Done));
        assert_eq!(r.phase(), Phase::Playing);
        assert_eq!(r.tick(epoch), None, "no ticks after playing");
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let mut r = connected();
        r.start_countdown().unwrap();
        let old = r.epoch();
        r.reset().unwrap();
        r.start_countdown().unwrap();
        assert_eq!(r.tick(old), None);
        assert_eq!(r.countdown(), 3);
    }

    #[test]
    fn test_select_requires_playing() {
        let mut r = connected();
        assert!(matches!(
            r.select(Choice::Rock),
            Err(RoundError::InvalidPhase { phase: Phase::Connected, .. })
        ));
    }

    #[test]
    fn test_select_only_once() {
        let mut r = playing();
        assert_eq!(r.select(Choice::Rock).unwrap(), None);
        assert_eq!(
            r.select(Choice::Paper),
            Err(RoundError::AlreadyChosen(Choice::Rock))
        );
        assert_eq!(r.phase(), Phase::Playing);
    }

    #[test]
    fn test_local_then_remote_resolves() {
        let mut r = playing();
        r.select(Choice::Rock).unwrap();
        assert_eq!(r.winner(), None);
        assert_eq!(
            r.record_remote(Choice::Scissors),
            RemoteChoice::Resolved(Winner::Local)
        );
        assert_eq!(r.phase(), Phase::Result);
        assert_eq!(r.winner(), Some(Winner::Local));
    }

    #[test]
    fn test_remote_before_local_is_kept_through_countdown() {
        // The peer may start and choose before we even start our round.
        let mut r = connected();
        assert_eq!(r.record_remote(Choice::Paper), RemoteChoice::Recorded);
        assert_eq!(r.phase(), Phase::Connected);
        assert_eq!(r.winner(), None);

        r.start_countdown().unwrap();
        let epoch = r.epoch();
        while r.tick(epoch) != Some(Tick::Done) {}
        assert_eq!(r.remote_choice(), Some(Choice::Paper));

        assert_eq!(r.select(Choice::Rock).unwrap(), Some(Winner::Remote));
        assert_eq!(r.phase(), Phase::Result);
    }

    #[test]
    fn test_duplicate_and_conflicting_remote_choice() {
        let mut r = playing();
        r.record_remote(Choice::Rock);
        assert_eq!(r.record_remote(Choice::Rock), RemoteChoice::Duplicate);
        assert_eq!(
            r.record_remote(Choice::Paper),
            RemoteChoice::Conflict {
                kept: Choice::Rock,
                ignored: Choice::Paper
            }
        );
        assert_eq!(r.remote_choice(), Some(Choice::Rock));
    }

    #[test]
    fn test_winner_set_iff_both_choices_set() {
        for a in Choice::ALL {
            for b in Choice::ALL {
                let mut r = playing();
                r.select(a).unwrap();
                assert!(r.winner().is_none());
                r.record_remote(b);
                assert!(r.winner().is_some());
                assert_eq!(r.phase(), Phase::Result);
            }
        }
    }

    #[test]
    fn test_reset_clears_round_and_returns_to_connected() {
        let mut r = playing();
        r.select(Choice::Rock).unwrap();
        r.record_remote(Choice::Rock);
        let before = r.epoch();

        r.reset().unwrap();
        assert_eq!(r.phase(), Phase::Connected);
        assert_eq!(r.local_choice(), None);
        assert_eq!(r.remote_choice(), None);
        assert_eq!(r.winner(), None);
        assert_eq!(r.countdown(), 3);
        assert!(r.epoch() > before);
    }

    #[test]
    fn test_reset_outside_session_is_refused() {
        let mut r = RoundState::default();
        assert!(r.reset().is_err());
        r.host().unwrap();
        assert!(r.reset().is_err());
    }

    #[test]
    fn test_abort_returns_to_idle_from_anywhere() {
        let mut r = playing();
        r.select(Choice::Paper).unwrap();
        r.abort();
        assert_eq!(r.phase(), Phase::Idle);
        assert_eq!(r.local_choice(), None);

        // Aborting an idle round is a no-op.
        r.abort();
        assert_eq!(r.phase(), Phase::Idle);
    }
}
