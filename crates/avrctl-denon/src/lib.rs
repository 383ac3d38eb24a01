//! Denon/Marantz receiver backend for avrctl.
//!
//! This crate plugs the Denon/Marantz telnet control protocol into the
//! generic connection engine in `avrctl-text-io`. It provides:
//!
//! - **Command registry** ([`commands`]) -- the prefixes, sub-parameters,
//!   levels and enumerated values the receivers understand, for the main
//!   zone and zones 2 and 3.
//! - **Protocol** ([`protocol`]) -- the [`DeviceProtocol`] implementation
//!   that loads the registry and parses report lines.
//! - **Builder** ([`builder`]) -- fluent builder API for configuring and
//!   opening an [`AvrConnection`].
//!
//! # Denon vs other line protocols
//!
//! - Lines end in a bare `\r`; there is no checksum or framing byte.
//! - The receiver echoes every change, whether caused by a command, the
//!   front panel or the remote, so one report stream carries both replies
//!   and unsolicited state.
//! - Queries are the prefix followed by `?` (`PW?`, `Z2?`) and are answered
//!   with one or more report lines.
//! - Levels use two digits relative to a zero point plus an optional third
//!   digit for half steps (`MV455` is -34.5 dB).
//!
//! # Example
//!
//! ```
//! use avrctl_denon::commands::denon_table;
//! use avrctl_core::{CommandLookup, CommandValue};
//! use avrctl_text_io::ParsedMessage;
//!
//! let table = denon_table();
//! let lookup = CommandLookup::from_table(&table);
//!
//! // Build a "set volume to -30.5 dB" command
//! let cmd = lookup.command("volume").unwrap().set(-30.5, 0).unwrap();
//! assert_eq!(cmd.message(), "MV495\r");
//!
//! // Parse the receiver's report
//! let report = ParsedMessage::parse("MV495", &table);
//! assert_eq!(report.attribute(), "volume");
//! assert_eq!(report.value(), Some(&CommandValue::Number(-30.5)));
//! ```

pub mod builder;
pub mod commands;
pub mod protocol;

pub use avrctl_text_io::{AvrConnection, DeviceProtocol};
pub use builder::DenonBuilder;
pub use commands::denon_table;
pub use protocol::DenonProtocol;
