//! The peer session supervisor: an isolated Tokio task that owns the
//! session.
//!
//! One supervisor per process owns at most one live link, the round,
//! the health monitor, the reconnect and reset state, and every timer.
//! The outside world talks to it through a [`SupervisorHandle`]: commands
//! go in over an mpsc channel and get a oneshot reply, observable state
//! comes out on a watch channel as a [`Snapshot`].
//!
//! The actor loop waits on every source at once (commands, inbound
//! links, the current link, finished transport work, timers), turns
//! whichever fires first into an [`Event`], and handles it to
//! completion before looking at the next one. No two handlers ever run
//! concurrently, so nothing here needs a lock.

use std::sync::Arc;

use duel_protocol::{Choice, JsonCodec, Message};
use duel_round::{Phase, RoundError, RoundState};
use duel_session::{
    HealthMonitor, HealthStatus, ProbeId, ReconnectController, ResetHandshake, Session,
    SessionError,
};
use duel_timer::TimerQueue;
use duel_transport::{Endpoint, Link, LinkEvent, LinkId, PeerId, Transport, TransportError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{DuelError, Snapshot, SupervisorConfig};

/// Reply channel for a command.
pub(crate) type Reply = oneshot::Sender<Result<(), DuelError>>;

/// Commands sent to the supervisor through its channel.
pub(crate) enum Command {
    HostRoom { reply: Reply },
    JoinRoom { remote: PeerId, reply: Reply },
    StartRound { reply: Reply },
    SelectChoice { choice: Choice, reply: Reply },
    RequestReset { reply: Reply },
    Shutdown { reply: Reply },
}

/// Results of transport work the supervisor runs on spawned tasks.
pub(crate) enum Internal {
    /// The local identity was created (or not).
    Bound(Result<Endpoint, TransportError>),
    /// An outbound open finished. `epoch` says which open it was.
    Opened {
        epoch: u64,
        remote: PeerId,
        result: Result<Link, TransportError>,
    },
}

/// Every timer the supervisor arms. Link-scoped timers carry the link
/// they were armed for, so firings from a superseded link are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKey {
    /// Send the next `ping`.
    Probe { link: LinkId },
    /// No `pong` for `probe` yet: Online → Unstable.
    Unstable { link: LinkId, probe: ProbeId },
    /// No `pong` for `probe` at all: the link is dead.
    Offline { link: LinkId, probe: ProbeId },
    /// `reset-pong` did not arrive in time.
    ResetDeadline { link: LinkId, token: u64 },
    /// Start reconnect attempt `attempt` of run `epoch`.
    Backoff { epoch: u64, attempt: u32 },
    /// Advance the countdown of round `round`.
    Countdown { round: u64 },
}

impl TimerKey {
    /// The link this timer belongs to, if it is link-scoped.
    pub(crate) fn link(&self) -> Option<LinkId> {
        match *self {
            Self::Probe { link }
            | Self::Unstable { link, .. }
            | Self::Offline { link, .. }
            | Self::ResetDeadline { link, .. } => Some(link),
            Self::Backoff { .. } | Self::Countdown { .. } => None,
        }
    }
}

/// One thing that happened, taken from whichever source fired first.
enum Event {
    Command(Command),
    /// Every handle was dropped.
    HandlesDropped,
    Inbound(Link),
    /// The endpoint stopped delivering inbound links.
    IncomingClosed,
    Link(LinkEvent),
    Internal(Internal),
    Timer(TimerKey),
}

/// Progress of the local identity.
#[derive(Debug)]
pub(crate) enum Identity {
    Pending,
    Bound,
    Failed(String),
}

/// The live link and who opened it.
pub(crate) struct ActiveLink {
    pub(crate) link: Link,
    /// The peer that called `open` for this link. Decides which of two
    /// simultaneous links both sides keep.
    pub(crate) dialer: PeerId,
}

// ---------------------------------------------------------------------------
// SupervisorHandle
// ---------------------------------------------------------------------------

/// Handle to a running supervisor.
///
/// Cheap to clone. Every action is a synchronous trigger into the
/// supervisor: the reply says whether it was accepted, and everything
/// that follows from it (a link opening, the peer's choice, a failure)
/// shows up in later snapshots.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl SupervisorHandle {
    /// Waits for a peer to connect to our identifier.
    pub async fn host_room(&self) -> Result<(), DuelError> {
        self.request(|reply| Command::HostRoom { reply }).await
    }

    /// Opens a link to `remote`. Failure to reach it is reported in
    /// [`Snapshot::last_error`] and the phase returns to idle.
    pub async fn join_room(&self, remote: PeerId) -> Result<(), DuelError> {
        self.request(|reply| Command::JoinRoom { remote, reply })
            .await
    }

    /// Starts the local countdown. Refused unless a link is up and the
    /// peer is Online.
    pub async fn start_round(&self) -> Result<(), DuelError> {
        self.request(|reply| Command::StartRound { reply }).await
    }

    /// Commits this round's choice and sends it to the peer.
    pub async fn select_choice(&self, choice: Choice) -> Result<(), DuelError> {
        self.request(|reply| Command::SelectChoice { choice, reply })
            .await
    }

    /// Asks the peer to confirm a reset. The local round is cleared only
    /// when it answers.
    pub async fn request_reset(&self) -> Result<(), DuelError> {
        self.request(|reply| Command::RequestReset { reply }).await
    }

    /// Closes the link and stops the supervisor.
    pub async fn shutdown(&self) -> Result<(), DuelError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// The latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Waits until a published state satisfies `pred`, checking the
    /// current one first.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, DuelError> {
        let mut rx = self.snapshot.clone();
        rx.wait_for(pred)
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| DuelError::SupervisorStopped)
    }

    /// Waits for the transport to assign our identifier.
    pub async fn local_id(&self) -> Result<PeerId, DuelError> {
        let snapshot = self
            .wait_for(|s| s.local_id.is_some() || s.last_error.is_some())
            .await?;
        match (snapshot.local_id, snapshot.last_error) {
            (Some(id), _) => Ok(id),
            (None, reason) => Err(SessionError::IdentityUnavailable(
                reason.unwrap_or_default(),
            )
            .into()),
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(Reply) -> Command,
    ) -> Result<(), DuelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| DuelError::SupervisorStopped)?;
        reply_rx.await.map_err(|_| DuelError::SupervisorStopped)?
    }
}

/// Spawns a supervisor over `transport` and returns a handle to it.
///
/// Creating the local identity starts immediately in the background;
/// [`SupervisorHandle::local_id`] resolves once it is assigned. Must be
/// called inside a Tokio runtime.
pub fn spawn<T: Transport>(transport: T, config: SupervisorConfig) -> SupervisorHandle {
    let config = config.validated();
    let (sender, commands) = mpsc::channel(config.command_buffer);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) =
        watch::channel(Snapshot::initial(config.round.countdown_ticks));
    let transport = Arc::new(transport);

    {
        let transport = Arc::clone(&transport);
        let internal_tx = internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.bind().await;
            let _ = internal_tx.send(Internal::Bound(result));
        });
    }

    let actor = Supervisor {
        transport,
        commands,
        internal_tx,
        internal_rx,
        incoming: None,
        identity: Identity::Pending,
        link: None,
        session: Session::new(),
        round: RoundState::new(config.round.clone()),
        health: HealthMonitor::new(config.health.clone()),
        reconnect: ReconnectController::new(config.reconnect.clone()),
        reset: ResetHandshake::new(config.reset.clone()),
        timers: TimerQueue::new(),
        codec: JsonCodec,
        open_seq: 0,
        opening: None,
        pending_join: false,
        last_error: None,
        snapshot_tx,
    };
    tokio::spawn(actor.run());

    SupervisorHandle {
        sender,
        snapshot: snapshot_rx,
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// The internal supervisor state. Runs inside a Tokio task.
pub(crate) struct Supervisor<T: Transport> {
    pub(crate) transport: Arc<T>,
    commands: mpsc::Receiver<Command>,
    pub(crate) internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    pub(crate) incoming: Option<mpsc::Receiver<Link>>,
    pub(crate) identity: Identity,
    pub(crate) link: Option<ActiveLink>,
    pub(crate) session: Session,
    pub(crate) round: RoundState,
    pub(crate) health: HealthMonitor,
    pub(crate) reconnect: ReconnectController,
    pub(crate) reset: ResetHandshake,
    pub(crate) timers: TimerQueue<TimerKey>,
    pub(crate) codec: JsonCodec,
    /// Counter for outbound opens.
    pub(crate) open_seq: u64,
    /// The open whose outcome still matters, if any.
    pub(crate) opening: Option<u64>,
    /// A join was requested before the identity was ready.
    pub(crate) pending_join: bool,
    pub(crate) last_error: Option<String>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl<T: Transport> Supervisor<T> {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        info!("supervisor started");

        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Event::Command(cmd),
                    None => Event::HandlesDropped,
                },
                link = next_inbound(&mut self.incoming) => match link {
                    Some(link) => Event::Inbound(link),
                    None => Event::IncomingClosed,
                },
                event = next_link_event(&mut self.link) => Event::Link(event),
                Some(internal) = self.internal_rx.recv() => Event::Internal(internal),
                fired = self.timers.wait_next() => Event::Timer(fired.key),
            };

            match event {
                Event::Command(Command::Shutdown { reply }) => {
                    info!("supervisor shutting down");
                    self.close_all();
                    self.publish();
                    let _ = reply.send(Ok(()));
                    break;
                }
                Event::HandlesDropped => {
                    debug!("all handles dropped");
                    self.close_all();
                    break;
                }
                Event::Command(cmd) => self.handle_command(cmd),
                Event::Inbound(link) => {
                    let dialer = link.remote().clone();
                    self.offer_link(link, dialer);
                }
                Event::IncomingClosed => {
                    warn!("endpoint stopped accepting links");
                    self.incoming = None;
                }
                Event::Link(LinkEvent::Data(bytes)) => self.on_data(&bytes),
                Event::Link(LinkEvent::Closed) => self.on_link_lost("link closed"),
                Event::Link(LinkEvent::Error(reason)) => self.on_link_lost(&reason),
                Event::Internal(Internal::Bound(result)) => self.on_bound(result),
                Event::Internal(Internal::Opened {
                    epoch,
                    remote,
                    result,
                }) => self.on_opened(epoch, remote, result),
                Event::Timer(key) => self.on_timer(key),
            }

            self.publish();
        }

        info!("supervisor stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::HostRoom { reply } => {
                let _ = reply.send(self.host_room());
            }
            Command::JoinRoom { remote, reply } => {
                let _ = reply.send(self.join_room(remote));
            }
            Command::StartRound { reply } => {
                let _ = reply.send(self.start_round());
            }
            Command::SelectChoice { choice, reply } => {
                let _ = reply.send(self.select_choice(choice));
            }
            Command::RequestReset { reply } => {
                let _ = reply.send(self.request_reset());
            }
            Command::Shutdown { reply } => {
                // Handled by the loop before dispatch.
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn host_room(&mut self) -> Result<(), DuelError> {
        self.require_identity()?;
        self.round.host()?;
        self.last_error = None;
        self.session.await_peer();
        match self.session.local_id() {
            Some(id) => info!(local_id = %id, "hosting room"),
            None => info!("hosting room, identity pending"),
        }
        Ok(())
    }

    fn join_room(&mut self, remote: PeerId) -> Result<(), DuelError> {
        self.require_identity()?;
        if self.session.local_id() == Some(&remote) {
            return Err(SessionError::PeerUnreachable {
                peer: remote,
                reason: "that is our own identifier".into(),
            }
            .into());
        }
        self.round.join()?;
        self.last_error = None;
        self.session.connect_to(remote.clone());
        info!(%remote, "joining room");
        if matches!(self.identity, Identity::Bound) {
            self.start_open(remote);
        } else {
            self.pending_join = true;
        }
        Ok(())
    }

    fn start_round(&mut self) -> Result<(), DuelError> {
        if self.link.is_none() {
            return Err(SessionError::NoLink.into());
        }
        let status = self.health.status();
        if status != HealthStatus::Online {
            return Err(SessionError::PeerNotHealthy(status).into());
        }
        let from = self.round.start_countdown()?;
        info!(countdown = from, "round starting");
        self.timers.schedule(
            self.round.config().tick,
            TimerKey::Countdown {
                round: self.round.epoch(),
            },
        );
        Ok(())
    }

    fn select_choice(&mut self, choice: Choice) -> Result<(), DuelError> {
        self.round.select(choice)?;
        info!(%choice, "choice committed");
        // Without a link the choice waits for the resync after reconnect.
        self.send(&Message::Choice { choice });
        Ok(())
    }

    fn request_reset(&mut self) -> Result<(), DuelError> {
        let phase = self.round.phase();
        if phase != Phase::Result {
            return Err(RoundError::InvalidPhase {
                action: "play again",
                phase,
            }
            .into());
        }
        let link = self.current_link_id().ok_or(SessionError::NoLink)?;
        self.send_reset_ping(link)?;
        Ok(())
    }

    fn require_identity(&self) -> Result<(), SessionError> {
        match &self.identity {
            Identity::Failed(reason) => Err(SessionError::IdentityUnavailable(reason.clone())),
            Identity::Pending | Identity::Bound => Ok(()),
        }
    }

    pub(crate) fn current_link_id(&self) -> Option<LinkId> {
        self.link.as_ref().map(|active| active.link.id())
    }

    pub(crate) fn is_current(&self, link: LinkId) -> bool {
        self.current_link_id() == Some(link)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.round.phase(),
            status: self.session.status(),
            peer: if self.link.is_some() {
                self.health.status()
            } else {
                HealthStatus::Offline
            },
            local_id: self.session.local_id().cloned(),
            remote_id: self.session.remote_id().cloned(),
            countdown: self.round.countdown(),
            local_choice: self.round.local_choice(),
            remote_choice: self.round.remote_choice(),
            winner: self.round.winner(),
            reconnect_attempt: self.reconnect.current().map(|attempt| attempt.count),
            last_error: self.last_error.clone(),
        }
    }

    /// Publishes the current state if it changed.
    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn next_inbound(incoming: &mut Option<mpsc::Receiver<Link>>) -> Option<Link> {
    match incoming {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_link_event(link: &mut Option<ActiveLink>) -> LinkEvent {
    match link {
        Some(active) => active.link.recv().await,
        None => std::future::pending().await,
    }
}
