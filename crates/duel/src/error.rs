//! Unified error type for duel.

use duel_protocol::ProtocolError;
use duel_round::RoundError;
use duel_session::SessionError;
use duel_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `duel` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// A transport-level error (bind, open, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (identity, reachability, health, reset).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The action is not legal in the current round phase.
    #[error(transparent)]
    Round(#[from] RoundError),

    /// The supervisor task has exited.
    #[error("supervisor is not running")]
    SupervisorStopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_round::Phase;
    use duel_session::HealthStatus;
    use duel_transport::PeerId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::PeerUnavailable(PeerId::new("gone"));
        let duel_err: DuelError = err.into();
        assert!(matches!(duel_err, DuelError::Transport(_)));
        assert!(duel_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let duel_err: DuelError = err.into();
        assert!(matches!(duel_err, DuelError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::PeerNotHealthy(HealthStatus::Unstable);
        let duel_err: DuelError = err.into();
        assert!(matches!(duel_err, DuelError::Session(_)));
        assert_eq!(duel_err.to_string(), "peer is unstable");
    }

    #[test]
    fn test_from_round_error() {
        let err = RoundError::InvalidPhase {
            action: "choose",
            phase: Phase::Idle,
        };
        let duel_err: DuelError = err.into();
        assert!(matches!(duel_err, DuelError::Round(_)));
    }
}
