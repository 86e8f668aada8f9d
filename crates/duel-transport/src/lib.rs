//! Transport abstraction layer for duel peers.
//!
//! The session supervisor treats the transport as a capability: it can
//! create a local identity, receive inbound links on it, and open a link
//! to a remote identity. Everything else (signaling servers, NAT
//! traversal, framing) belongs to the implementation.
//!
//! Every implementation produces the same channel-backed [`Link`], so the
//! supervisor never needs to be generic over a connection type.
//!
//! # Implementations
//!
//! - [`MemoryNetwork`] / [`MemoryTransport`]: in-process, with fault
//!   injection (partitions, severed links). Used by tests.
//! - `WebSocketTransport` (feature `websocket`, default): identity is
//!   the listen address.

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a peer endpoint, shared out of band so the other
/// side can connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Process-unique identifier for a single link instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    /// Allocates the next unused ID.
    pub fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Options for [`Transport::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Request an ordered, reliable channel. The supervisor always sets
    /// this; the session protocol has no retransmission of its own.
    pub reliable: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { reliable: true }
    }
}

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A payload from the remote peer.
    Data(Vec<u8>),
    /// The link closed, cleanly or because the remote went away.
    Closed,
    /// The link failed. No further events follow.
    Error(String),
}

impl LinkEvent {
    /// `true` for `Closed` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkEvent::Data(_))
    }
}

/// A single open, bidirectional, in-order channel to a remote peer.
///
/// Transports drive the link from background tasks: bytes written with
/// [`send`](Self::send) go out through `outbound`, and everything the
/// remote sends (plus the final close) arrives through `inbound`.
/// Dropping the link closes it.
#[derive(Debug)]
pub struct Link {
    id: LinkId,
    remote: PeerId,
    reliable: bool,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// Assembles a link from the channels a transport's IO tasks service.
    pub fn from_channels(
        remote: PeerId,
        reliable: bool,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self {
            id: LinkId::next(),
            remote,
            reliable,
            outbound,
            inbound,
        }
    }

    /// Queues a payload for the remote peer.
    ///
    /// # Errors
    /// [`TransportError::LinkClosed`] if the transport side has gone away.
    pub fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(data)
            .map_err(|_| TransportError::LinkClosed(self.id))
    }

    /// Waits for the next event. Returns [`LinkEvent::Closed`] forever
    /// once the transport side has finished.
    pub async fn recv(&mut self) -> LinkEvent {
        self.inbound.recv().await.unwrap_or(LinkEvent::Closed)
    }

    /// Closes the link. The remote observes [`LinkEvent::Closed`].
    pub fn close(self) {
        tracing::debug!(link = %self.id, remote = %self.remote, "closing link");
    }

    /// Whether the outbound side is still accepting data.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Whether the link was opened as ordered and reliable.
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// The identity on the other end.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// Returns the unique identifier for this link.
    pub fn id(&self) -> LinkId {
        self.id
    }
}

/// A bound local identity and the stream of links other peers open to it.
#[derive(Debug)]
pub struct Endpoint {
    /// The identifier other peers use to reach us.
    pub local_id: PeerId,
    /// Inbound links, in arrival order.
    pub incoming: mpsc::Receiver<Link>,
}

/// The transport capability consumed by the session supervisor.
///
/// Methods return `Send` futures so the supervisor can run them on
/// spawned tasks while its own loop keeps servicing timers.
pub trait Transport: Send + Sync + 'static {
    /// Creates the local identity and starts accepting inbound links.
    fn bind(&self) -> impl Future<Output = Result<Endpoint, TransportError>> + Send;

    /// Opens a link to `remote`. Resolves once the link is open.
    fn open(
        &self,
        remote: &PeerId,
        options: OpenOptions,
    ) -> impl Future<Output = Result<Link, TransportError>> + Send;
}
