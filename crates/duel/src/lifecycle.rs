//! Link lifecycle: identity, opens, accepting and replacing links,
//! reconnection, timers and teardown.

use std::cmp;
use std::sync::Arc;

use duel_protocol::Message;
use duel_round::{Phase, Tick};
use duel_session::{ReconnectStep, SessionError};
use duel_transport::{Endpoint, Link, LinkId, OpenOptions, PeerId, Transport, TransportError};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::supervisor::{ActiveLink, Identity, Internal, Supervisor, TimerKey};

impl<T: Transport> Supervisor<T> {
    pub(crate) fn on_bound(&mut self, result: Result<Endpoint, TransportError>) {
        match result {
            Ok(endpoint) => {
                self.session.assign_local_id(endpoint.local_id);
                self.incoming = Some(endpoint.incoming);
                self.identity = Identity::Bound;
                if std::mem::take(&mut self.pending_join) {
                    if let Some(remote) = self.session.remote_id().cloned() {
                        self.start_open(remote);
                    }
                }
            }
            Err(e) => {
                let err = SessionError::IdentityUnavailable(e.to_string());
                self.identity = Identity::Failed(e.to_string());
                if self.round.phase().is_awaiting_link() {
                    self.fail(err);
                } else {
                    error!(error = %err, "no local identity");
                    self.last_error = Some(err.to_string());
                }
            }
        }
    }

    /// Opens a link to `remote` on a spawned task. The outcome comes back
    /// as [`Internal::Opened`]; an open still pending after
    /// `open_timeout` comes back as a failure.
    pub(crate) fn start_open(&mut self, remote: PeerId) {
        self.open_seq += 1;
        let epoch = self.open_seq;
        self.opening = Some(epoch);
        debug!(%remote, epoch, "opening link");

        let transport = Arc::clone(&self.transport);
        let internal_tx = self.internal_tx.clone();
        let limit = self.reconnect.config().open_timeout;
        tokio::spawn(async move {
            let open = transport.open(&remote, OpenOptions::default());
            let outcome = time::timeout(limit, open).await;
            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectFailed {
                    peer: remote.clone(),
                    reason: format!("no answer within {}ms", limit.as_millis()),
                }),
            };
            let _ = internal_tx.send(Internal::Opened {
                epoch,
                remote,
                result,
            });
        });
    }

    pub(crate) fn on_opened(
        &mut self,
        epoch: u64,
        remote: PeerId,
        result: Result<Link, TransportError>,
    ) {
        let current = self.opening == Some(epoch);
        if current {
            self.opening = None;
        }
        match result {
            // Even a superseded open is offered: when both sides dial at
            // once, each must see both links to keep the same one.
            Ok(link) => match self.session.local_id().cloned() {
                Some(local) => self.offer_link(link, local),
                None => link.close(),
            },
            Err(e) if current => {
                if self.round.phase() == Phase::Joining {
                    self.fail(SessionError::PeerUnreachable {
                        peer: remote,
                        reason: e.to_string(),
                    });
                } else if self.reconnect.is_active() {
                    warn!(%remote, error = %e, "reconnect attempt failed");
                    self.retry_or_give_up(remote);
                } else {
                    debug!(%remote, error = %e, "open failed after it stopped mattering");
                }
            }
            Err(e) => debug!(%remote, epoch, error = %e, "ignoring stale open failure"),
        }
    }

    /// Decides whether to take `link`, opened by `dialer`, as the live
    /// link. Rejected links are closed without touching any state.
    ///
    /// Without a live link: any peer while hosting, otherwise only the
    /// paired peer. With one: only the paired peer, and only if the new
    /// link [`supersedes`](Self::supersedes) the current one.
    pub(crate) fn offer_link(&mut self, link: Link, dialer: PeerId) {
        let remote = link.remote().clone();
        let accept = match &self.link {
            Some(current) => {
                self.session.is_remote(&remote) && self.supersedes(&dialer, &current.dialer)
            }
            None => match self.round.phase() {
                Phase::RoomSetup => true,
                phase if phase == Phase::Joining || phase.is_in_session() => {
                    self.session.is_remote(&remote)
                }
                _ => false,
            },
        };

        if !accept {
            debug!(
                link = %link.id(),
                %remote,
                phase = %self.round.phase(),
                "rejecting link"
            );
            link.close();
            return;
        }
        self.install_link(link, dialer);
    }

    /// Two live links to the same peer: a peer that dials again has given
    /// up on its earlier link, and for links dialed from opposite ends
    /// both sides keep the one the smaller identifier opened.
    fn supersedes(&self, offered: &PeerId, current: &PeerId) -> bool {
        if offered == current {
            return true;
        }
        match (self.session.local_id(), self.session.remote_id()) {
            (Some(local), Some(remote)) => offered == cmp::min(local, remote),
            _ => false,
        }
    }

    fn install_link(&mut self, link: Link, dialer: PeerId) {
        let id = link.id();
        let remote = link.remote().clone();

        let replaced = self.link.take();
        let mut reset_pending = false;
        if let Some(old) = &replaced {
            info!(old = %old.link.id(), new = %id, "replacing link");
            self.drop_link_timers(old.link.id());
            reset_pending = self.reset.is_pending();
            self.reset.abandon();
        }
        if let Some(old) = replaced {
            old.link.close();
        } else {
            self.health.reset();
        }

        info!(link = %id, %remote, reliable = link.is_reliable(), "link installed");
        self.link = Some(ActiveLink { link, dialer });
        self.opening = None;
        self.pending_join = false;
        self.last_error = None;
        self.session.link_up(remote);

        if self.round.phase().is_awaiting_link() {
            if let Err(e) = self.round.link_established() {
                warn!(error = %e, "link installed outside connection setup");
            }
        }
        if self.reconnect.succeed().is_some() {
            self.timers
                .retain(|key| !matches!(key, TimerKey::Backoff { .. }));
        }

        self.probe(id);
        self.resync_choice();
        if reset_pending {
            // The old link may have eaten the request or its answer.
            debug!("repeating reset request on new link");
            if let Err(e) = self.send_reset_ping(id) {
                warn!(error = %e, "could not repeat reset request");
            }
        }
    }

    /// Starts the initiator side of the reset handshake on `link`: sends
    /// `reset-ping` and arms the confirmation deadline.
    pub(crate) fn send_reset_ping(&mut self, link: LinkId) -> Result<(), SessionError> {
        let pending = self.reset.initiate(Instant::now())?;
        self.send(&Message::ResetPing);
        self.timers.schedule_at(
            pending.deadline,
            TimerKey::ResetDeadline {
                link,
                token: pending.token,
            },
        );
        Ok(())
    }

    /// Sends `ping` on `link`, arms its unstable and offline timers, and
    /// schedules the next probe.
    fn probe(&mut self, link: LinkId) {
        let probe = self.health.begin_probe();
        self.send(&Message::Ping);

        let config = self.health.config();
        let (unstable, offline, interval) = (
            config.unstable_after,
            config.offline_after,
            config.probe_interval,
        );
        self.timers
            .schedule(unstable, TimerKey::Unstable { link, probe });
        self.timers
            .schedule(offline, TimerKey::Offline { link, probe });
        self.timers.schedule(interval, TimerKey::Probe { link });
    }

    /// A choice sent just before the old link died may be lost; resend it
    /// while we are still waiting for the peer's.
    fn resync_choice(&mut self) {
        if self.round.phase() != Phase::Playing {
            return;
        }
        if let Some(choice) = self.round.local_choice() {
            debug!(%choice, "resending choice on new link");
            self.send(&Message::Choice { choice });
        }
    }

    /// The live link is gone. In session this starts reconnection to the
    /// same peer; identities and the round are kept.
    pub(crate) fn on_link_lost(&mut self, reason: &str) {
        let Some(active) = self.link.take() else {
            return;
        };
        let id = active.link.id();
        let remote = active.link.remote().clone();
        warn!(link = %id, %remote, reason, "link lost");
        active.link.close();

        self.drop_link_timers(id);
        self.reset.abandon();
        self.health.mark_offline();
        self.session.link_down();

        if !self.round.phase().is_in_session() {
            self.fail(SessionError::PeerUnreachable {
                peer: remote,
                reason: reason.to_string(),
            });
            return;
        }

        let attempt = self.reconnect.begin();
        self.timers.schedule(
            attempt.next_delay,
            TimerKey::Backoff {
                epoch: self.reconnect.epoch(),
                attempt: attempt.count,
            },
        );
    }

    fn retry_or_give_up(&mut self, remote: PeerId) {
        match self.reconnect.on_failure() {
            ReconnectStep::Retry { attempt, delay } => {
                self.timers.schedule(
                    delay,
                    TimerKey::Backoff {
                        epoch: self.reconnect.epoch(),
                        attempt,
                    },
                );
            }
            ReconnectStep::GiveUp { attempts } => {
                self.fail(SessionError::ReconnectExhausted {
                    peer: remote,
                    attempts,
                });
            }
        }
    }

    pub(crate) fn on_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::Probe { link } if self.is_current(link) => self.probe(link),
            TimerKey::Unstable { link, probe } if self.is_current(link) => {
                self.health.on_unstable_timeout(probe);
            }
            TimerKey::Offline { link, probe } if self.is_current(link) => {
                if self.health.on_offline_timeout(probe) {
                    self.on_link_lost("peer offline");
                }
            }
            TimerKey::ResetDeadline { link, token } if self.is_current(link) => {
                // Never reset against a peer that cannot confirm it.
                if self.reset.on_deadline(token) {
                    self.health.mark_offline();
                    self.on_link_lost("reset not confirmed");
                }
            }
            TimerKey::Backoff { epoch, attempt } => {
                if !self.reconnect.is_current(epoch, attempt) {
                    debug!(epoch, attempt, "ignoring stale backoff timer");
                    return;
                }
                match self.session.remote_id().cloned() {
                    Some(remote) => {
                        info!(
                            attempt,
                            max = self.reconnect.config().max_attempts,
                            %remote,
                            "reconnect attempt"
                        );
                        self.start_open(remote);
                    }
                    None => self.reconnect.cancel(),
                }
            }
            TimerKey::Countdown { round } => {
                if let Some(Tick::Continue(_)) = self.round.tick(round) {
                    self.timers
                        .schedule(self.round.config().tick, TimerKey::Countdown { round });
                }
            }
            stale => debug!(?stale, "ignoring timer of a superseded link"),
        }
    }

    fn drop_link_timers(&mut self, link: LinkId) {
        self.timers.retain(|key| key.link() != Some(link));
    }

    /// Terminal failure: everything is torn down, the phase returns to
    /// idle and `err` becomes the user-visible message.
    pub(crate) fn fail(&mut self, err: SessionError) {
        error!(error = %err, "session failed");
        self.close_all();
        self.last_error = Some(err.to_string());
    }

    /// Closes the link, cancels every timer and forgets the peer. The
    /// local identity is kept.
    pub(crate) fn close_all(&mut self) {
        if let Some(active) = self.link.take() {
            active.link.close();
        }
        self.timers.clear();
        self.opening = None;
        self.pending_join = false;
        self.reconnect.cancel();
        self.reset.abandon();
        self.health.reset();
        self.round.abort();
        self.session.disconnect();
    }
}
