//! Core protocol types for the duel wire format.
//!
//! This module defines every type that travels "on the wire" between the
//! two peers. The set is closed: five message kinds, nothing else. Both
//! peers run the same protocol version, so there is no version field and
//! no extension mechanism.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Choice — the hand gesture a player commits for a round
// ---------------------------------------------------------------------------

/// One of the three hand gestures.
///
/// `#[serde(rename_all = "lowercase")]` makes the JSON representation
/// `"rock"`, `"paper"`, `"scissors"`, which is what the peer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    /// Every choice, in a fixed order. Handy for exhaustive tests.
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// The choice this one defeats under the cyclic rule:
    /// rock beats scissors, scissors beats paper, paper beats rock.
    pub fn beats(self) -> Choice {
        match self {
            Choice::Rock => Choice::Scissors,
            Choice::Scissors => Choice::Paper,
            Choice::Paper => Choice::Rock,
        }
    }

    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Choice::Rock),
            "paper" => Ok(Choice::Paper),
            "scissors" => Ok(Choice::Scissors),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown choice: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Message — everything that can travel between the peers
// ---------------------------------------------------------------------------

/// A single wire message.
///
/// `#[serde(tag = "type", rename_all = "kebab-case")]` produces an
/// "internally tagged" JSON object whose `type` field names the variant:
///
/// ```text
/// Choice { choice: Rock }  →  {"type":"choice","choice":"rock"}
/// Ping                     →  {"type":"ping"}
/// ResetPing                →  {"type":"reset-ping"}
/// ```
///
/// Messages are immutable and one-shot. They carry no identifiers, so
/// the only ordering guarantee is the one the link itself provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Commit this round's selection.
    Choice { choice: Choice },

    /// Liveness probe. The receiver answers with [`Message::Pong`].
    Ping,

    /// Liveness probe reply.
    Pong,

    /// Request a round reset. The receiver resets and answers with
    /// [`Message::ResetPong`].
    ResetPing,

    /// Confirms a reset request.
    ResetPong,
}

impl Message {
    /// The wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Choice { .. } => "choice",
            Message::Ping => "ping",
            Message::Pong => "pong",
            Message::ResetPing => "reset-ping",
            Message::ResetPong => "reset-pong",
        }
    }
}

impl From<Choice> for Message {
    fn from(choice: Choice) -> Self {
        Message::Choice { choice }
    }
}

// =========================================================================
// Tests
// =========================================================================
