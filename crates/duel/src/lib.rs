//! # Duel
//!
//! A self-healing two-peer session that plays rock-paper-scissors
//! rounds over a direct, ordered, reliable channel.
//!
//! The game rule is the easy part. The [`Supervisor`](spawn) keeps the
//! session consistent over a channel that can die silently: it probes
//! the peer and classifies it Online, Unstable or Offline, reconnects to
//! the same peer with bounded linear backoff after a mid-session drop,
//! and clears a finished round only after the peer confirms the reset.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duel::prelude::*;
//!
//! # async fn demo() -> Result<(), DuelError> {
//! let network = MemoryNetwork::new();
//! let host = duel::spawn(network.transport(), SupervisorConfig::default());
//! let guest = duel::spawn(network.transport(), SupervisorConfig::default());
//!
//! host.host_room().await?;
//! guest.join_room(host.local_id().await?).await?;
//! guest.wait_for(|s| s.is_ready()).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod lifecycle;
mod snapshot;
mod supervisor;

pub use config::SupervisorConfig;
pub use error::DuelError;
pub use snapshot::Snapshot;
pub use supervisor::{SupervisorHandle, spawn};

pub use duel_protocol::{Choice, Message};
pub use duel_round::{Phase, Winner};
pub use duel_session::{HealthStatus, SessionStatus};
pub use duel_transport::PeerId;

/// The types most front ends need.
pub mod prelude {
    pub use crate::{
        Choice, DuelError, HealthStatus, Phase, PeerId, SessionStatus, Snapshot,
        SupervisorConfig, SupervisorHandle, Winner,
    };
    pub use duel_transport::{MemoryNetwork, MemoryTransport, Transport};
    #[cfg(feature = "websocket")]
    pub use duel_transport::WebSocketTransport;
}
