//! Peer session bookkeeping for duel.
//!
//! This crate holds the pieces of the session supervisor that are pure
//! state: they decide, the supervisor acts. None of them touch the
//! network or arm timers themselves; each returns what the supervisor
//! should send or schedule next.
//!
//! 1. **Identity**: who we are and who we're talking to ([`Session`])
//! 2. **Health**: is the peer answering probes ([`HealthMonitor`])
//! 3. **Reconnection**: bounded retries after a mid-round drop
//!    ([`ReconnectController`])
//! 4. **Reset handshake**: liveness-confirmed round reset
//!    ([`ResetHandshake`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Supervisor (above)  ← owns one of each, routes messages and timers
//!     ↕
//! Session Layer (this crate)  ← health, retries, reset confirmation
//!     ↕
//! Transport Layer (below)  ← provides PeerId
//! ```

mod error;
mod health;
mod reconnect;
mod reset;
mod session;

pub use error::SessionError;
pub use health::{HealthConfig, HealthMonitor, HealthStatus, PeerHealth, ProbeId};
pub use reconnect::{ReconnectAttempt, ReconnectConfig, ReconnectController, ReconnectStep};
pub use reset::{PendingReset, ResetConfig, ResetHandshake};
pub use session::{Session, SessionStatus};
