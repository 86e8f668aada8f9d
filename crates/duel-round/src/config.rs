//! Round configuration and phase machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// RoundConfig
// ---------------------------------------------------------------------------

/// Timing of the local countdown that precedes `Playing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    /// Number of countdown ticks. The countdown shows this value first
    /// and enters `Playing` when it reaches zero.
    pub countdown_ticks: u32,

    /// Duration of one countdown tick.
    pub tick: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 3,
            tick: Duration::from_secs(1),
        }
    }
}

impl RoundConfig {
    /// Clamp values so the countdown always has at least one tick of
    /// non-zero length.
    pub fn validated(mut self) -> Self {
        if self.countdown_ticks == 0 {
            warn!("countdown_ticks is 0, using 1");
            self.countdown_ticks = 1;
        }
        if self.tick.is_zero() {
            warn!("countdown tick is zero, using 1ms");
            self.tick = Duration::from_millis(1);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the local side is in the session and the round.
///
/// ```text
/// Idle ─┬─(host)──→ RoomSetup ─┐
///       └─(join)──→ Joining ───┴─(link open)─→ Connected ─(start)─→ Countdown
///                                                  ↑                    │
///                                                  │               (ticks done)
///                                                  │                    ▼
///                                   (reset handshake)─── Result ←─(both chose)── Playing
/// ```
///
/// Any phase can fall back to `Idle` on an unrecoverable disconnect.
/// A reset request from the peer returns any in-session phase to
/// `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// No link and no pending host/join.
    Idle,
    /// Hosting: waiting for the peer to open a link to us.
    RoomSetup,
    /// Joining: an outbound open is in flight.
    Joining,
    /// Link open; a round may be started.
    Connected,
    /// Local visual lead-in. No network effect.
    Countdown,
    /// Waiting for the local and/or remote choice.
    Playing,
    /// Both choices known and the winner computed.
    Result,
}

impl Phase {
    /// `true` once a link has been established for this session. Losing
    /// the link in one of these phases triggers reconnection rather than
    /// teardown.
    pub fn is_in_session(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Countdown | Self::Playing | Self::Result
        )
    }

    /// `true` while waiting for the first link of a session.
    pub fn is_awaiting_link(self) -> bool {
        matches!(self, Self::RoomSetup | Self::Joining)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        if target == Self::Idle {
            return self != Self::Idle;
        }
        match (self, target) {
            (Self::Idle, Self::RoomSetup | Self::Joining) => true,
            (Self::RoomSetup | Self::Joining, Self::Connected) => true,
            (Self::Connected, Self::Countdown) => true,
            (Self::Countdown, Self::Playing) => true,
            (Self::Playing, Self::Result) => true,
            // Reset: the initiator only from Result, the responder from
            // anywhere in session.
            (from, Self::Connected) => from.is_in_session(),
            _ => false,
        }
    }

    /// The kebab-case name used on screen and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RoomSetup => "room-setup",
            Self::Joining => "joining",
            Self::Connected => "connected",
            Self::Countdown => "countdown",
            Self::Playing => "playing",
            Self::Result => "result",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
