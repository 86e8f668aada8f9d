//! Supervisor configuration.

use duel_round::RoundConfig;
use duel_session::{HealthConfig, ReconnectConfig, ResetConfig};
use tracing::warn;

/// Every timing knob of a supervisor, grouped by the component that
/// owns it.
///
/// The defaults are the protocol constants: probe every 5s, Unstable
/// after 2s and Offline after 10s without a `pong`, 5 reconnect attempts
/// with a 2s base delay, 2s to confirm a reset, and a 3-tick countdown
/// of 1s per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub health: HealthConfig,
    pub reconnect: ReconnectConfig,
    pub reset: ResetConfig,
    pub round: RoundConfig,
    /// Capacity of the command channel between handles and the actor.
    pub command_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health: HealthConfig::default(),
            reconnect: ReconnectConfig::default(),
            reset: ResetConfig::default(),
            round: RoundConfig::default(),
            command_buffer: 32,
        }
    }
}

impl SupervisorConfig {
    /// Validates every section. See each section's `validated`.
    pub fn validated(mut self) -> Self {
        self.health = self.health.validated();
        self.reconnect = self.reconnect.validated();
        self.reset = self.reset.validated();
        self.round = self.round.validated();
        if self.command_buffer == 0 {
            warn!("command_buffer is 0, using 1");
            self.command_buffer = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_already_valid() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.clone().validated(), cfg);
    }

    #[test]
    fn test_validated_reaches_every_section() {
        let mut cfg = SupervisorConfig::default();
        cfg.command_buffer = 0;
        cfg.reconnect.max_attempts = 0;
        cfg.health.offline_after = Duration::from_secs(1);
        cfg.round.countdown_ticks = 0;

        let cfg = cfg.validated();
        assert_eq!(cfg.command_buffer, 1);
        assert_eq!(cfg.reconnect.max_attempts, 1);
        assert!(cfg.health.offline_after > cfg.health.unstable_after);
        assert_eq!(cfg.round.countdown_ticks, 1);
    }
}
