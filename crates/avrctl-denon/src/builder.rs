//! DenonBuilder -- fluent builder for Denon/Marantz [`AvrConnection`]s.
//!
//! Separates configuration from construction so that callers can set up
//! pacing, heartbeat and retry timing before the TCP connection is opened.
//!
//! # Example
//!
//! ```no_run
//! use avrctl_denon::builder::DenonBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> avrctl_core::Result<()> {
//! let avr = DenonBuilder::new("192.168.1.40")
//!     .command_timeout(Duration::from_millis(300))
//!     .auto_reconnect(true)
//!     .connect()
//!     .await?;
//! let volume = avr.commands().command("volume")?.set(-30.5, 1)?;
//! let reply = avr.send_command_awaitable(volume).await?.await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use avrctl_core::error::{Error, Result};
use avrctl_core::events::{self, AvrEvent};
use avrctl_core::{DeviceState, StateSink};
use avrctl_text_io::{AvrConnection, ConnectionConfig};

use crate::protocol::DenonProtocol;

/// Fluent builder for a Denon/Marantz [`AvrConnection`].
///
/// Every setting has a default, so the simplest usage is:
///
/// ```ignore
/// let avr = DenonBuilder::new("avr.local").connect().await?;
/// ```
///
/// Without [`state_sink()`](Self::state_sink), state updates are merged into
/// a fresh [`DeviceState`]; without [`events()`](Self::events), a new event
/// channel is created. Either is reachable later through the connection's
/// [`subscribe()`](AvrConnection::subscribe).
pub struct DenonBuilder {
    config: ConnectionConfig,
    auto_reconnect: bool,
    sink: Option<Arc<dyn StateSink>>,
    events: Option<broadcast::Sender<AvrEvent>>,
}

impl DenonBuilder {
    /// Create a builder for the receiver at `host`.
    pub fn new(host: &str) -> Self {
        DenonBuilder {
            config: ConnectionConfig::new(host),
            auto_reconnect: false,
            sink: None,
            events: None,
        }
    }

    /// Override the control port (default: 23).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the TCP connect timeout (default: 10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the idle time before a heartbeat query is sent, or `None` to
    /// disable heartbeats (default: 10s).
    pub fn heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set how long a heartbeat has to provoke a reply before the link is
    /// declared dead (default: 5s).
    pub fn heartbeat_grace(mut self, grace: Duration) -> Self {
        self.config.heartbeat_grace = grace;
        self
    }

    /// Set the minimum spacing between transmitted commands (default: 50ms).
    pub fn message_interval(mut self, interval: Duration) -> Self {
        self.config.message_interval = interval;
        self
    }

    /// Set the wait after each transmission before an unanswered command is
    /// resent (default: 250ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the lifetime of an awaited command (default: 10s).
    pub fn command_expiration(mut self, expiration: Duration) -> Self {
        self.config.command_expiration = expiration;
        self
    }

    /// Set the wait between reconnect attempts (default: 10s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Reconnect automatically when an established connection is lost
    /// (default: off).
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the number of QoS tiers (default: 5).
    pub fn qos_levels(mut self, levels: u8) -> Self {
        self.config.qos_levels = levels;
        self
    }

    /// Merge state updates into `sink` instead of a private [`DeviceState`].
    pub fn state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publish events on an existing channel.
    pub fn events(mut self, sender: broadcast::Sender<AvrEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Build an unconnected [`AvrConnection`].
    pub fn build(self) -> Result<AvrConnection> {
        self.config.validate()?;

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(DeviceState::new()) as Arc<dyn StateSink>);
        let event_tx = self.events.unwrap_or_else(events::channel);

        Ok(AvrConnection::new(
            self.config,
            Arc::new(DenonProtocol),
            sink,
            event_tx,
        ))
    }

    /// Build an [`AvrConnection`] and open it.
    pub async fn connect(self) -> Result<AvrConnection> {
        let auto_reconnect = self.auto_reconnect;
        let avr = self.build()?;
        let delay = avr.config().reconnect_delay;
        avr.init(auto_reconnect, delay).await?;
        Ok(avr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrctl_core::{CommandValue, ConnectionState, QOS_LEVELS};
    use avrctl_test_harness::MockAvrServer;
    use avrctl_text_io::connection::{
        DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MESSAGE_INTERVAL, DEFAULT_PORT,
    };

    #[test]
    fn builder_defaults() {
        let avr = DenonBuilder::new("avr.local").build().unwrap();
        let config = avr.config();

        assert_eq!(config.host, "avr.local");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.heartbeat_interval, Some(DEFAULT_HEARTBEAT_INTERVAL));
        assert_eq!(config.message_interval, DEFAULT_MESSAGE_INTERVAL);
        assert_eq!(config.qos_levels, QOS_LEVELS);
        assert_eq!(avr.current_state(), ConnectionState::Disconnected);
        assert!(avr.commands().get("power").is_some());
    }

    #[test]
    fn builder_custom_settings() {
        let avr = DenonBuilder::new("10.0.0.5")
            .port(2323)
            .heartbeat_interval(None)
            .message_interval(Duration::from_millis(20))
            .command_timeout(Duration::from_millis(200))
            .command_expiration(Duration::from_secs(2))
            .qos_levels(4)
            .build()
            .unwrap();
        let config = avr.config();

        assert_eq!(config.address(), "10.0.0.5:2323");
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.message_interval, Duration::from_millis(20));
        assert_eq!(config.command_timeout, Duration::from_millis(200));
        assert_eq!(config.command_expiration, Duration::from_secs(2));
        assert_eq!(config.qos_levels, 4);
    }

    #[test]
    fn builder_rejects_bad_settings() {
        assert!(matches!(
            DenonBuilder::new("").build(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            DenonBuilder::new("avr.local").qos_levels(0).build(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn builder_rejects_zero_interval() {
        assert!(matches!(
            DenonBuilder::new("avr.local")
                .message_interval(Duration::ZERO)
                .build(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            DenonBuilder::new("avr.local")
                .command_timeout(Duration::ZERO)
                .build(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let server = MockAvrServer::start().await.unwrap();
        server.reply("MV?", &["MV455", "MVMAX 98"]);
        let state = Arc::new(DeviceState::new());
        let events = events::channel();
        let mut rx = events.subscribe();

        let avr = DenonBuilder::new("127.0.0.1")
            .port(server.port())
            .heartbeat_interval(None)
            .message_interval(Duration::from_millis(10))
            .command_timeout(Duration::from_millis(100))
            .reconnect_delay(Duration::from_millis(50))
            .auto_reconnect(true)
            .state_sink(state.clone())
            .events(events)
            .connect()
            .await
            .unwrap();

        assert_eq!(avr.current_state(), ConnectionState::Connected);
        assert_eq!(rx.recv().await.unwrap(), AvrEvent::Connected);

        let query = avr.commands().command("volume").unwrap().query(1);
        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            avr.send_command_awaitable(query).await.unwrap(),
        )
        .await
        .unwrap()
        .expect("a reply");
        assert_eq!(reply.value(), Some(&CommandValue::Number(-34.5)));
        assert_eq!(state.get("volume"), Some(Some(CommandValue::Number(-34.5))));

        avr.disconnect().await;
        assert_eq!(avr.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_failure_is_returned() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = DenonBuilder::new("127.0.0.1")
            .port(port)
            .connect_timeout(Duration::from_millis(500))
            .connect()
            .await;
        assert!(result.is_err());
    }
}
