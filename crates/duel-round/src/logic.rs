//! The winner rule.
//!
//! Both peers run [`resolve`] independently on the pair they observed.
//! The rule is total and deterministic, so the two sides always agree on
//! the outcome and differ only in which side they call "local".

use std::fmt;

use duel_protocol::Choice;
use serde::{Deserialize, Serialize};

/// Outcome of a round from the local side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Local,
    Remote,
    Tie,
}

impl Winner {
    /// The same outcome seen from the other peer.
    pub fn flipped(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
            Self::Tie => Self::Tie,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "you win",
            Self::Remote => "you lose",
            Self::Tie => "tie",
        })
    }
}

/// Rock beats scissors, scissors beats paper, paper beats rock; equal
/// choices tie.
pub fn resolve(local: Choice, remote: Choice) -> Winner {
    if local == remote {
        Winner::Tie
    } else if local.beats() == remote {
        Winner::Local
    } else {
        Winner::Remote
    }
}
