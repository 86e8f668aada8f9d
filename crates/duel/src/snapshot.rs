//! What a front end can observe about a supervisor.

use duel_protocol::Choice;
use duel_round::{Phase, Winner};
use duel_session::{HealthStatus, SessionStatus};
use duel_transport::PeerId;

/// An immutable copy of everything observable, published after every
/// event the supervisor handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    /// Link-level session status.
    pub status: SessionStatus,
    /// Health of the peer on the current link. Offline when there is none.
    pub peer: HealthStatus,
    /// Our identifier, once the transport has assigned it. Share it out
    /// of band so the peer can join.
    pub local_id: Option<PeerId>,
    pub remote_id: Option<PeerId>,
    /// Remaining countdown ticks.
    pub countdown: u32,
    pub local_choice: Option<Choice>,
    pub remote_choice: Option<Choice>,
    pub winner: Option<Winner>,
    /// 1-based number of the reconnect attempt scheduled or in flight.
    pub reconnect_attempt: Option<u32>,
    /// The last user-visible failure. Cleared by the next host, join or
    /// successful link.
    pub last_error: Option<String>,
}

impl Snapshot {
    /// The state of a supervisor that has not handled anything yet.
    pub fn initial(countdown: u32) -> Self {
        Self {
            phase: Phase::Idle,
            status: SessionStatus::Disconnected,
            peer: HealthStatus::Offline,
            local_id: None,
            remote_id: None,
            countdown,
            local_choice: None,
            remote_choice: None,
            winner: None,
            reconnect_attempt: None,
            last_error: None,
        }
    }

    /// `true` when a link is up and the peer answered its last probe.
    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Connected && self.peer == HealthStatus::Online
    }
}
