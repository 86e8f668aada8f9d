//! Wire protocol for duel peers.
//!
//! This crate defines the "language" two peers speak over their channel:
//!
//! - **Types** ([`Message`], [`Choice`]) — the closed set of messages
//!   that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the session
//! supervisor. It doesn't know about links, timers, or rounds. It only
//! knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Supervisor (session + round)
//! ```
//!
//! Messages carry no identifiers or sequence numbers. Ordering relies
//! entirely on the transport's in-order delivery on a single link.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Choice, Message};
