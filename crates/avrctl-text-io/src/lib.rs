//! Protocol engine for line-oriented receiver control (Denon/Marantz style).
//!
//! One [`AvrConnection`] owns the TCP stream and runs a reader, a paced
//! queue drain and a heartbeat per session. Outgoing commands pass through
//! a QoS-tiered queue that keeps one pending command per attribute; awaited
//! commands are matched to report lines, resent, and expired by the
//! correlation engine.
//!
//! # Architecture
//!
//! - [`protocol`] -- `\r`-terminated line framing
//! - [`queue`] -- the coalescing priority queue
//! - [`message`] -- tokenizing and decoding incoming lines
//! - [`correlation`] -- response matching, retries and expiry
//! - [`connection`] -- connection lifecycle and session tasks

pub mod connection;
pub mod correlation;
pub mod message;
pub mod protocol;
pub mod queue;

pub use connection::{AvrConnection, ConnectionConfig, DeviceProtocol};
pub use correlation::{Correlator, PendingResponse, RetryPolicy};
pub use message::{ParsedMessage, SuggestedCommand, Tokens};
pub use queue::{CommandQueue, PushOutcome};
