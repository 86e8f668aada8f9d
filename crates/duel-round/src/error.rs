//! Error types for the round layer.

use duel_protocol::Choice;

use crate::Phase;

/// Errors from local player actions that the current round refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    /// The action is not legal in the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },

    /// A choice was already committed this round.
    #[error("already chose {0} this round")]
    AlreadyChosen(Choice),
}
