//! In-process transport with fault injection.
//!
//! A [`MemoryNetwork`] is a shared switchboard. Each [`MemoryTransport`]
//! registers one identity on it; opening a link creates two relay tasks
//! (one per direction) that forward payloads between the endpoints.
//!
//! Faults:
//! - [`MemoryNetwork::partition`] silently drops traffic between two
//!   peers and refuses new links between them. Existing links stay
//!   "open", which is exactly the silent link death heartbeats exist for.
//! - [`MemoryNetwork::sever`] closes existing links between two peers.
//! - [`MemoryNetwork::unregister`] makes an identity disappear.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use rand::Rng;
use tokio::sync::{mpsc, watch};

use crate::{Endpoint, Link, LinkEvent, OpenOptions, PeerId, Transport, TransportError};

/// Capacity of each endpoint's inbound link queue.
const INCOMING_CAPACITY: usize = 16;

/// Both directions of one link pair.
struct Wire {
    ends: (PeerId, PeerId),
    silenced: Arc<AtomicBool>,
    cut: watch::Sender<bool>,
}

impl Wire {
    fn connects(&self, pair: &(PeerId, PeerId)) -> bool {
        &self.ends == pair
    }

    fn touches(&self, id: &PeerId) -> bool {
        &self.ends.0 == id || &self.ends.1 == id
    }
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<PeerId, mpsc::Sender<Link>>,
    partitions: HashSet<(PeerId, PeerId)>,
    wires: Vec<Wire>,
}

impl NetworkState {
    /// Drops bookkeeping for wires whose relays have both finished.
    fn prune(&mut self) {
        self.wires.retain(|w| w.cut.receiver_count() > 0);
    }
}

/// Orders a pair so `(a, b)` and `(b, a)` share one key.
fn pair(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Shared in-process network. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that will bind a random identity.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            requested: None,
            local: OnceLock::new(),
        }
    }

    /// A transport that will bind the given identity.
    pub fn transport_with_id(&self, id: impl Into<PeerId>) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            requested: Some(id.into()),
            local: OnceLock::new(),
        }
    }

    /// Silently drops all traffic between `a` and `b` and refuses new
    /// links between them until [`heal`](Self::heal).
    pub fn partition(&self, a: &PeerId, b: &PeerId) {
        let key = pair(a, b);
        let mut state = self.lock();
        for wire in state.wires.iter().filter(|w| w.connects(&key)) {
            wire.silenced.store(true, Ordering::Relaxed);
        }
        tracing::debug!(%a, %b, "memory network partitioned");
        state.partitions.insert(key);
    }

    /// Undoes [`partition`](Self::partition).
    pub fn heal(&self, a: &PeerId, b: &PeerId) {
        let key = pair(a, b);
        let mut state = self.lock();
        for wire in state.wires.iter().filter(|w| w.connects(&key)) {
            wire.silenced.store(false, Ordering::Relaxed);
        }
        tracing::debug!(%a, %b, "memory network healed");
        state.partitions.remove(&key);
    }

    /// Closes every existing link between `a` and `b`. Both sides observe
    /// [`LinkEvent::Closed`]. New links may still be opened.
    pub fn sever(&self, a: &PeerId, b: &PeerId) {
        let key = pair(a, b);
        let mut state = self.lock();
        for wire in state.wires.iter().filter(|w| w.connects(&key)) {
            let _ = wire.cut.send(true);
        }
        state.prune();
    }

    /// Removes an identity: it stops receiving links, and all of its
    /// existing links close.
    pub fn unregister(&self, id: &PeerId) {
        let mut state = self.lock();
        state.endpoints.remove(id);
        for wire in state.wires.iter().filter(|w| w.touches(id)) {
            let _ = wire.cut.send(true);
        }
        state.prune();
    }

    /// Whether `id` is currently registered.
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.lock().endpoints.contains_key(id)
    }

    /// Number of link pairs whose relays are still running.
    pub fn live_wires(&self) -> usize {
        let mut state = self.lock();
        state.prune();
        state.wires.len()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // A poisoned lock only means a test panicked mid-update; the
        // bookkeeping is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, id: PeerId) -> Result<Endpoint, TransportError> {
        let mut state = self.lock();
        if state.endpoints.contains_key(&id) {
            return Err(TransportError::IdentityInUse(id));
        }
        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        state.endpoints.insert(id.clone(), tx);
        tracing::debug!(%id, "memory endpoint registered");
        Ok(Endpoint {
            local_id: id,
            incoming: rx,
        })
    }

    async fn connect(
        &self,
        local: &PeerId,
        remote: &PeerId,
        options: OpenOptions,
    ) -> Result<Link, TransportError> {
        // Build both ends under the lock, deliver outside it.
        let (acceptor, inbound_link, outbound_link) = {
            let mut state = self.lock();
            if state.partitions.contains(&pair(local, remote)) {
                return Err(TransportError::PeerUnavailable(remote.clone()));
            }
            let acceptor = state
                .endpoints
                .get(remote)
                .cloned()
                .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

            let silenced = Arc::new(AtomicBool::new(false));
            let (cut_tx, cut_rx) = watch::channel(false);

            let (local_out_tx, local_out_rx) = mpsc::unbounded_channel();
            let (local_in_tx, local_in_rx) = mpsc::unbounded_channel();
            let (remote_out_tx, remote_out_rx) = mpsc::unbounded_channel();
            let (remote_in_tx, remote_in_rx) = mpsc::unbounded_channel();

            tokio::spawn(relay(
                local_out_rx,
                remote_in_tx,
                Arc::clone(&silenced),
                cut_rx.clone(),
            ));
            tokio::spawn(relay(remote_out_rx, local_in_tx, Arc::clone(&silenced), cut_rx));

            state.prune();
            state.wires.push(Wire {
                ends: pair(local, remote),
                silenced,
                cut: cut_tx,
            });

            let outbound_link =
                Link::from_channels(remote.clone(), options.reliable, local_out_tx, local_in_rx);
            let inbound_link =
                Link::from_channels(local.clone(), options.reliable, remote_out_tx, remote_in_rx);
            (acceptor, inbound_link, outbound_link)
        };

        acceptor
            .send(inbound_link)
            .await
            .map_err(|_| TransportError::PeerUnavailable(remote.clone()))?;

        tracing::debug!(%local, %remote, link = %outbound_link.id(), "memory link opened");
        Ok(outbound_link)
    }
}

/// Forwards one direction of a wire until either side goes away or the
/// wire is cut, then tells the receiving side the link closed.
async fn relay(
    mut from: mpsc::UnboundedReceiver<Vec<u8>>,
    to: mpsc::UnboundedSender<LinkEvent>,
    silenced: Arc<AtomicBool>,
    mut cut: watch::Receiver<bool>,
) {
    loop {
        if *cut.borrow() {
            break;
        }
        tokio::select! {
            data = from.recv() => match data {
                Some(bytes) => {
                    if silenced.load(Ordering::Relaxed) {
                        tracing::trace!(len = bytes.len(), "dropping payload on partitioned wire");
                        continue;
                    }
                    if to.send(LinkEvent::Data(bytes)).is_err() {
                        break;
                    }
                }
                None => break,
            },
            changed = cut.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    let _ = to.send(LinkEvent::Closed);
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    requested: Option<PeerId>,
    local: OnceLock<PeerId>,
}

impl MemoryTransport {
    /// The bound identity, if [`bind`](Transport::bind) has completed.
    pub fn local_id(&self) -> Option<&PeerId> {
        self.local.get()
    }
}

impl Transport for MemoryTransport {
    async fn bind(&self) -> Result<Endpoint, TransportError> {
        if self.local.get().is_some() {
            return Err(TransportError::AlreadyBound);
        }
        let id = self.requested.clone().unwrap_or_else(random_peer_id);
        let endpoint = self.network.register(id.clone())?;
        self.local.set(id).map_err(|_| TransportError::AlreadyBound)?;
        Ok(endpoint)
    }

    async fn open(&self, remote: &PeerId, options: OpenOptions) -> Result<Link, TransportError> {
        let local = self.local.get().ok_or(TransportError::NotBound)?;
        if !self.network.is_registered(local) {
            return Err(TransportError::Shutdown);
        }
        self.network.connect(local, remote, options).await
    }
}

/// Generates a random 16-character hex identity (64 bits).
fn random_peer_id() -> PeerId {
    let bytes: [u8; 8] = rand::rng().random();
    PeerId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}
