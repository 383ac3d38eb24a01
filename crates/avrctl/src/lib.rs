//! # avrctl -- Network Control for Audio/Video Receivers
//!
//! `avrctl` is an asynchronous Rust library for controlling Denon and
//! Marantz audio/video receivers over their line-oriented telnet protocol.
//! It is designed for home automation, where commands must survive a busy
//! or briefly unreachable receiver and every front-panel change should be
//! reflected in local state.
//!
//! ## Quick Start
//!
//! Add `avrctl` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! avrctl = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a receiver and turn it on:
//!
//! ```no_run
//! use avrctl::denon::DenonBuilder;
//!
//! #[tokio::main]
//! async fn main() -> avrctl::Result<()> {
//!     let avr = DenonBuilder::new("192.168.1.40")
//!         .auto_reconnect(true)
//!         .connect()
//!         .await?;
//!
//!     let power = avr.commands().command("power")?.set(true, 1)?;
//!     match avr.send_command_awaitable(power).await?.await {
//!         Some(reply) => println!("receiver reported {}", reply),
//!         None => println!("no reply"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `avrctl-core`         | Command registry, typed commands, state, errors  |
//! | `avrctl-text-io`      | Line codec, QoS queue, correlation, connection   |
//! | `avrctl-denon`        | Denon/Marantz command table and protocol         |
//! | **`avrctl`**          | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature | Enables                               | Default |
//! |---------|---------------------------------------|---------|
//! | `denon` | [`denon`] module (Denon/Marantz)      | yes     |
//!
//! ## Quality of Service
//!
//! Every command carries a QoS tier. Higher tiers leave the queue first and
//! are resent more often when unanswered; a queued command for an attribute
//! is replaced by a newer one of the same or higher tier.
//!
//! ## Event Subscription
//!
//! Connections publish [`AvrEvent`]s through a broadcast channel:
//!
//! ```no_run
//! use avrctl::AvrEvent;
//! # async fn example(avr: &avrctl::AvrConnection) {
//! let mut events = avr.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         AvrEvent::StateUpdated { attribute, value, .. } => {
//!             println!("{} = {:?}", attribute, value);
//!         }
//!         other => println!("{:?}", other),
//!     }
//! }
//! # }
//! ```

pub use avrctl_core::*;
pub use avrctl_text_io::{AvrConnection, ConnectionConfig, DeviceProtocol, ParsedMessage};

/// Protocol engine: framing, the QoS queue, correlation and the connection
/// manager.
pub mod text_io {
    pub use avrctl_text_io::*;
}

/// Denon/Marantz backend.
///
/// Provides [`DenonBuilder`](denon::DenonBuilder) and the command table
/// for Denon and Marantz receivers, covering the main zone and zones 2
/// and 3.
#[cfg(feature = "denon")]
pub mod denon {
    pub use avrctl_denon::*;
}
