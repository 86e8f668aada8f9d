//! Heartbeat-based peer health classification.
//!
//! While a link is open the supervisor sends `ping` every
//! [`HealthConfig::probe_interval`] and arms two one-shot timers per probe:
//! *unstable* and *offline*. A `pong` cancels every outstanding probe and
//! marks the peer Online. Without one, the status decays:
//!
//! ```text
//!   Online ──(unstable timer)──→ Unstable ──(offline timer)──→ Offline
//!     ↑                              │
//!     └────────────(pong)────────────┘
//! ```
//!
//! Status never improves without a fresh `pong`, and elapsed time alone
//! never takes Online straight to Offline: every probe's unstable timer
//! is strictly earlier than its offline timer.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

/// Probe cadence and thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// How often to send `ping`.
    pub probe_interval: Duration,
    /// No `pong` this long after a `ping` → Unstable.
    pub unstable_after: Duration,
    /// No `pong` this long after a `ping` → Offline and the link is dead.
    /// Must be strictly greater than `unstable_after`.
    pub offline_after: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            unstable_after: Duration::from_secs(2),
            offline_after: Duration::from_secs(10),
        }
    }
}

impl HealthConfig {
    /// Fix any out-of-range values so the config is safe to use.
    ///
    /// - `probe_interval` and `unstable_after` at least 1ms.
    /// - `offline_after` forced strictly above `unstable_after`.
    pub fn validated(mut self) -> Self {
        let min = Duration::from_millis(1);
        if self.probe_interval < min {
            warn!("probe_interval too small, using 1ms");
            self.probe_interval = min;
        }
        if self.unstable_after < min {
            warn!("unstable_after too small, using 1ms");
            self.unstable_after = min;
        }
        if self.offline_after <= self.unstable_after {
            let fixed = self.unstable_after * 2;
            warn!(
                offline_ms = self.offline_after.as_millis() as u64,
                unstable_ms = self.unstable_after.as_millis() as u64,
                fixed_ms = fixed.as_millis() as u64,
                "offline_after must exceed unstable_after, adjusting"
            );
            self.offline_after = fixed;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Reachability of the peer process, distinct from link open/closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Online,
    Unstable,
    Offline,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Unstable => "unstable",
            Self::Offline => "offline",
        })
    }
}

/// Current classification and when the last `pong` arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerHealth {
    pub status: HealthStatus,
    pub last_pong_at: Option<Instant>,
}

/// Identifies one probe cycle; carried in its timer keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(u64);

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Probing side of the health protocol for one link.
///
/// The responder side (answering `ping` with `pong`) needs no state and
/// lives in the supervisor.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    health: PeerHealth,
    next_probe: u64,
    outstanding: BTreeSet<ProbeId>,
}

impl HealthMonitor {
    /// A monitor for a link that has not answered anything yet. The peer
    /// starts Offline until its first `pong`.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config: config.validated(),
            health: PeerHealth {
                status: HealthStatus::Offline,
                last_pong_at: None,
            },
            next_probe: 0,
            outstanding: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn health(&self) -> PeerHealth {
        self.health
    }

    pub fn status(&self) -> HealthStatus {
        self.health.status
    }

    /// Number of probes still waiting for a `pong`.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Starts a probe cycle. The caller sends `ping` and arms the
    /// unstable and offline timers for the returned id.
    pub fn begin_probe(&mut self) -> ProbeId {
        let id = ProbeId(self.next_probe);
        self.next_probe += 1;
        self.outstanding.insert(id);
        id
    }

    /// A `pong` arrived: every outstanding probe is answered. Returns
    /// `true` if the status changed.
    pub fn on_pong(&mut self, now: Instant) -> bool {
        self.outstanding.clear();
        self.health.last_pong_at = Some(now);
        self.set_status(HealthStatus::Online)
    }

    /// The unstable timer of `probe` fired. Returns `true` if the status
    /// dropped to Unstable.
    pub fn on_unstable_timeout(&mut self, probe: ProbeId) -> bool {
        if !self.outstanding.contains(&probe) {
            return false;
        }
        // Only decay; an Offline peer does not become Unstable by waiting.
        if self.health.status != HealthStatus::Online {
            return false;
        }
        self.set_status(HealthStatus::Unstable)
    }

    /// The offline timer of `probe` fired. Returns `true` if the link
    /// must now be treated as dead.
    pub fn on_offline_timeout(&mut self, probe: ProbeId) -> bool {
        if !self.outstanding.remove(&probe) {
            return false;
        }
        self.outstanding.clear();
        self.set_status(HealthStatus::Offline);
        true
    }

    /// Forces Offline, e.g. when a reset goes unconfirmed or the link
    /// closes. Outstanding probes are forgotten.
    pub fn mark_offline(&mut self) -> bool {
        self.outstanding.clear();
        self.set_status(HealthStatus::Offline)
    }

    /// Forgets everything for a new link.
    pub fn reset(&mut self) {
        self.outstanding.clear();
        self.health = PeerHealth {
            status: HealthStatus::Offline,
            last_pong_at: None,
        };
    }

    fn set_status(&mut self, next: HealthStatus) -> bool {
        if self.health.status == next {
            return false;
        }
        match next {
            HealthStatus::Online => info!(from = %self.health.status, "peer online"),
            HealthStatus::Unstable => warn!("peer unstable: no pong yet"),
            HealthStatus::Offline => warn!(from = %self.health.status, "peer offline"),
        }
        self.health.status = next;
        true
    }
}
