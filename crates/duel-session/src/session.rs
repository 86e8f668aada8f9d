//! Session identity: the data that survives a reconnection.
//!
//! A "session" is the local record of who we are and who we're paired
//! with. It tracks:
//! - WHO we are (`local_id`, assigned asynchronously by the transport)
//! - WHO the peer is (`remote_id`, known once a link opens or a join
//!   is requested)
//! - WHETHER a link is currently up (`status`)
//!
//! Reconnection keeps both identifiers; only a terminal failure or a
//! fresh host/join clears the remote one.

use std::fmt;

use duel_transport::PeerId;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Link-level status of the session.
///
/// ```text
///   Disconnected ──(host / join)──→ Connecting ──(link open)──→ Connected
///        ↑                              ↑                           │
///        │                              └──────(link lost)──────────┤
///        └──────────────(terminal failure)──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No link and nothing pending.
    Disconnected,
    /// Waiting for a first link, or reconnecting after losing one.
    Connecting,
    /// A link is open.
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Local and remote identity plus link status. Mutated only by the
/// supervisor.
#[derive(Debug, Clone)]
pub struct Session {
    local_id: Option<PeerId>,
    remote_id: Option<PeerId>,
    status: SessionStatus,
}

impl Session {
    /// A session with no identities yet.
    pub fn new() -> Self {
        Self {
            local_id: None,
            remote_id: None,
            status: SessionStatus::Disconnected,
        }
    }

    pub fn local_id(&self) -> Option<&PeerId> {
        self.local_id.as_ref()
    }

    pub fn remote_id(&self) -> Option<&PeerId> {
        self.remote_id.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Records the identity the transport assigned us.
    pub fn assign_local_id(&mut self, id: PeerId) {
        tracing::info!(local_id = %id, "local identity assigned");
        self.local_id = Some(id);
    }

    /// Waiting for a peer to connect to us.
    pub fn await_peer(&mut self) {
        self.remote_id = None;
        self.status = SessionStatus::Connecting;
    }

    /// Opening a link to `remote`.
    pub fn connect_to(&mut self, remote: PeerId) {
        self.remote_id = Some(remote);
        self.status = SessionStatus::Connecting;
    }

    /// A link to `remote` is open.
    pub fn link_up(&mut self, remote: PeerId) {
        tracing::info!(%remote, "session connected");
        self.remote_id = Some(remote);
        self.status = SessionStatus::Connected;
    }

    /// The link dropped; identities are kept for reconnection.
    pub fn link_down(&mut self) {
        self.status = SessionStatus::Connecting;
    }

    /// Terminal teardown: forget the peer.
    pub fn disconnect(&mut self) {
        if self.status != SessionStatus::Disconnected {
            tracing::info!(remote = ?self.remote_id, "session disconnected");
        }
        self.remote_id = None;
        self.status = SessionStatus::Disconnected;
    }

    /// Whether `peer` is the one this session is paired with.
    pub fn is_remote(&self, peer: &PeerId) -> bool {
        self.remote_id.as_ref() == Some(peer)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PeerId {
        PeerId::new(s)
    }

    #[test]
    fn test_new_session_is_disconnected_without_ids() {
        let s = Session::new();
        assert_eq!(s.status(), SessionStatus::Disconnected);
        assert!(s.local_id().is_none());
        assert!(s.remote_id().is_none());
    }

    #[test]
    fn test_host_flow_learns_remote_on_link_up() {
        let mut s = Session::new();
        s.assign_local_id(pid("me"));
        s.await_peer();
        assert_eq!(s.status(), SessionStatus::Connecting);
        assert!(s.remote_id().is_none());

        s.link_up(pid("them"));
        assert_eq!(s.status(), SessionStatus::Connected);
        assert!(s.is_remote(&pid("them")));
    }

    #[test]
    fn test_link_down_keeps_identities() {
        let mut s = Session::new();
        s.assign_local_id(pid("me"));
        s.connect_to(pid("them"));
        s.link_up(pid("them"));

        s.link_down();
        assert_eq!(s.status(), SessionStatus::Connecting);
        assert_eq!(s.local_id(), Some(&pid("me")));
        assert_eq!(s.remote_id(), Some(&pid("them")));
    }

    #[test]
    fn test_disconnect_forgets_remote_but_not_local() {
        let mut s = Session::new();
        s.assign_local_id(pid("me"));
        s.connect_to(pid("them"));
        s.disconnect();
        assert_eq!(s.status(), SessionStatus::Disconnected);
        assert!(s.remote_id().is_none());
        assert_eq!(s.local_id(), Some(&pid("me")));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Connecting.to_string(), "connecting");
    }
}
