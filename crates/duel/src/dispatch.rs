//! Inbound message routing.
//!
//! Every payload on the live link is decoded and dispatched by tag:
//!   - `ping` / `pong` → health (the responder side keeps no state)
//!   - `reset-ping` / `reset-pong` → reset handshake, then the round
//!   - `choice` → the round, whatever its phase

use duel_protocol::{Choice, Codec, Message};
use duel_round::RemoteChoice;
use duel_transport::Transport;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::supervisor::{Supervisor, TimerKey};

impl<T: Transport> Supervisor<T> {
    pub(crate) fn on_data(&mut self, bytes: &[u8]) {
        // Both ends run the same protocol, so an unreadable message is a
        // bug on the other side. Nothing to retry.
        let msg: Message = match self.codec.decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, len = bytes.len(), "dropping undecodable message");
                return;
            }
        };
        trace!(tag = msg.tag(), "message received");

        match msg {
            Message::Ping => self.send(&Message::Pong),
            Message::Pong => self.on_pong(),
            Message::ResetPing => self.on_reset_ping(),
            Message::ResetPong => self.on_reset_pong(),
            Message::Choice { choice } => self.on_remote_choice(choice),
        }
    }

    /// Encodes `msg` and queues it on the live link. Without a link the
    /// message is dropped; a failed send is followed by the link's close
    /// event, which is handled there.
    pub(crate) fn send(&self, msg: &Message) {
        let Some(active) = &self.link else {
            debug!(tag = msg.tag(), "no link, message not sent");
            return;
        };
        let bytes = match self.codec.encode(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, tag = msg.tag(), "failed to encode message");
                return;
            }
        };
        if let Err(e) = active.link.send(bytes) {
            debug!(error = %e, tag = msg.tag(), "send failed");
        }
    }

    fn on_pong(&mut self) {
        self.health.on_pong(Instant::now());
        if let Some(current) = self.current_link_id() {
            self.timers.retain(|key| {
                !matches!(
                    key,
                    TimerKey::Unstable { link, .. } | TimerKey::Offline { link, .. }
                        if *link == current
                )
            });
        }
        // A healthy pong proves the link; any retry budget starts over.
        self.reconnect.cancel();
    }

    /// Responder side: always confirm and always reset, even with our own
    /// request outstanding. The peer's request covers ours.
    fn on_reset_ping(&mut self) {
        self.send(&Message::ResetPong);
        if self.reset.is_pending() {
            debug!("peer reset first, dropping our own request");
            self.reset.abandon();
            self.timers
                .retain(|key| !matches!(key, TimerKey::ResetDeadline { .. }));
        }
        self.reset_round("peer requested it");
    }

    /// Initiator side: the peer confirmed, so it is safe to clear.
    fn on_reset_pong(&mut self) {
        let Some(pending) = self.reset.on_reset_pong() else {
            return;
        };
        self.timers.retain(|key| {
            !matches!(key, TimerKey::ResetDeadline { token, .. } if *token == pending.token)
        });
        self.reset_round("peer confirmed");
    }

    fn reset_round(&mut self, reason: &'static str) {
        match self.round.reset() {
            Ok(()) => {
                info!(reason, "round reset");
                self.timers
                    .retain(|key| !matches!(key, TimerKey::Countdown { .. }));
            }
            Err(e) => warn!(error = %e, "round reset refused"),
        }
    }

    fn on_remote_choice(&mut self, choice: Choice) {
        match self.round.record_remote(choice) {
            RemoteChoice::Recorded => debug!(%choice, phase = %self.round.phase(), "peer chose"),
            RemoteChoice::Resolved(winner) => debug!(%winner, "peer's choice completed the round"),
            // Messages carry no round, so a repeat may be the peer's
            // next round. Never answer it.
            RemoteChoice::Duplicate => debug!(%choice, "peer repeated its choice"),
            RemoteChoice::Conflict { kept, ignored } => {
                warn!(%kept, %ignored, "conflicting choice from peer ignored");
            }
        }
    }
}
