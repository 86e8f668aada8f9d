//! Error types for the session layer.

use duel_transport::PeerId;

use crate::HealthStatus;

/// Errors that can occur during session management.
///
/// The `Display` text is what the user sees, so it is phrased for them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The local identity could not be created. Not retried.
    #[error("could not create local identity: {0}")]
    IdentityUnavailable(String),

    /// The requested remote identifier does not exist or cannot be
    /// reached. Not retried.
    #[error("could not reach {peer}: {reason}")]
    PeerUnreachable { peer: PeerId, reason: String },

    /// Reconnection gave up. Terminal for the session.
    #[error("lost connection to {peer} after {attempts} reconnect attempts")]
    ReconnectExhausted { peer: PeerId, attempts: u32 },

    /// Starting a round needs a peer confirmed online.
    #[error("peer is {0}")]
    PeerNotHealthy(HealthStatus),

    /// The action needs an open link.
    #[error("not connected to a peer")]
    NoLink,

    /// A reset request is already waiting for confirmation.
    #[error("a reset is already pending")]
    ResetPending,
}
