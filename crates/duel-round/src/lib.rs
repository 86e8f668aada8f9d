//! Round state machine for duel sessions.
//!
//! A round is one play-through: both peers commit a [`Choice`], each side
//! independently resolves the winner, and the round waits in `Result`
//! until a reset handshake sends it back to `Connected`.
//!
//! # Key types
//!
//! - [`Phase`]: lifecycle state machine, including the pre-connection
//!   phases the supervisor drives
//! - [`RoundState`]: phase plus both choices, winner, and countdown
//! - [`Winner`] / [`resolve`]: the fixed cyclic rule
//! - [`RoundConfig`]: countdown length and tick duration
//!
//! [`Choice`]: duel_protocol::Choice

mod config;
mod error;
mod logic;
mod round;

pub use config::{Phase, RoundConfig};
pub use error::RoundError;
pub use logic::{Winner, resolve};
pub use round::{RemoteChoice, RoundState, Tick};
