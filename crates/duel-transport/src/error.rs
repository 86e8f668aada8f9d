use crate::{LinkId, PeerId};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link was closed.
    #[error("link {0} is closed")]
    LinkClosed(LinkId),

    /// The requested remote identifier does not exist or cannot be
    /// reached right now.
    #[error("peer {0} is unavailable")]
    PeerUnavailable(PeerId),

    /// Establishing an outbound link failed.
    #[error("connect to {peer} failed: {reason}")]
    ConnectFailed { peer: PeerId, reason: String },

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Another endpoint already holds this identity.
    #[error("identity {0} is already in use")]
    IdentityInUse(PeerId),

    /// `open` was called before the local identity was created.
    #[error("transport has no local identity yet")]
    NotBound,

    /// The transport has already been bound.
    #[error("transport is already bound")]
    AlreadyBound,

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
