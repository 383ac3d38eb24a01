//! avrctl-test-harness: Test utilities for avrctl.
//!
//! This crate provides [`MockAvrServer`], a scripted receiver control port
//! for end-to-end testing of the connection manager without real hardware.

pub mod mock_tcp;

pub use mock_tcp::MockAvrServer;
