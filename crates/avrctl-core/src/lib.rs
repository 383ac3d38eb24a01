//! avrctl-core: Core types, command model, and error definitions for avrctl.
//!
//! This crate holds the pieces every receiver backend shares: the registry
//! that describes a command grammar, the named command specs built from it,
//! the level codec, the state cache, and the event and error types.
//! Applications depend on these without pulling in a protocol engine.
//!
//! # Key types
//!
//! - [`CommandTable`] -- the nested command registry
//! - [`CommandLookup`] / [`CommandSpec`] -- named, encodable commands
//! - [`CommandInstance`] -- a rendered line with QoS and sequence
//! - [`AvrEvent`] -- asynchronous connection and state notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod codec;
pub mod command;
pub mod error;
pub mod events;
pub mod registry;
pub mod state;
pub mod types;

// Re-export key types at crate root for ergonomic `use avrctl_core::*`.
pub use command::{CommandInstance, CommandLookup, CommandSpec, Intent, ValueDomain};
pub use error::{Error, Result};
pub use events::AvrEvent;
pub use registry::{Choice, CommandEntry, CommandTable};
pub use state::{DeviceState, StateSink, StateUpdate};
pub use types::*;
