//! Core types used throughout avrctl.

use std::fmt;
use std::str::FromStr;

/// Number of QoS tiers in the outgoing command queue (0 = lowest).
pub const QOS_LEVELS: u8 = 5;

/// Retry budget indexed by the QoS a command was *submitted* with.
///
/// The budget is fixed at submission time; the one-step QoS escalation that
/// happens on first transmission does not change it.
pub const RETRY_BUDGET: [u8; QOS_LEVELS as usize] = [0, 1, 2, 2, 2];

/// Look up the retry budget for an initial QoS tier.
///
/// Tiers above the table saturate at the top entry.
pub fn retry_budget(qos: u8) -> u8 {
    let idx = (qos as usize).min(RETRY_BUDGET.len() - 1);
    RETRY_BUDGET[idx]
}

/// A typed command or state value.
///
/// Receivers speak strings on the wire; once decoded a value is a boolean
/// (`ON`/`OFF` style enumerations), a number (decibels, levels) or free text
/// (source names, surround modes).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    /// A boolean switch such as power or mute.
    Bool(bool),
    /// A numeric level, typically in dB.
    Number(f64),
    /// Free or enumerated text.
    Text(String),
}

impl CommandValue {
    /// Return the boolean if this is a [`CommandValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CommandValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Return the number if this is a [`CommandValue::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CommandValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Return the text if this is a [`CommandValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CommandValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandValue::Bool(b) => write!(f, "{b}"),
            CommandValue::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            CommandValue::Number(n) => write!(f, "{n}"),
            CommandValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for CommandValue {
    fn from(b: bool) -> Self {
        CommandValue::Bool(b)
    }
}

impl From<f64> for CommandValue {
    fn from(n: f64) -> Self {
        CommandValue::Number(n)
    }
}

impl From<i32> for CommandValue {
    fn from(n: i32) -> Self {
        CommandValue::Number(f64::from(n))
    }
}

impl From<&str> for CommandValue {
    fn from(s: &str) -> Self {
        CommandValue::Text(s.to_string())
    }
}

impl From<String> for CommandValue {
    fn from(s: String) -> Self {
        CommandValue::Text(s)
    }
}

/// Inclusive bounds of a numeric command, in user units (usually dB).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueBounds {
    /// Lowest accepted value.
    pub min: f64,
    /// Highest accepted value.
    pub max: f64,
}

impl ValueBounds {
    /// Create a bounds pair.
    pub fn new(min: f64, max: f64) -> Self {
        ValueBounds { min, max }
    }

    /// Whether `value` lies within the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Lifecycle state of a receiver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket and no reconnect loop running.
    #[default]
    Disconnected,
    /// Socket open, background tasks running.
    Connected,
    /// Connection lost; a fixed-delay reconnect loop is running.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`ConnectionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConnectionStateError(String);

impl fmt::Display for ParseConnectionStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown connection state: {}", self.0)
    }
}

impl std::error::Error for ParseConnectionStateError {}

impl FromStr for ConnectionState {
    type Err = ParseConnectionStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnected" => Ok(ConnectionState::Disconnected),
            "connected" => Ok(ConnectionState::Connected),
            "reconnecting" => Ok(ConnectionState::Reconnecting),
            _ => Err(ParseConnectionStateError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_follows_initial_qos() {
        assert_eq!(retry_budget(0), 0);
        assert_eq!(retry_budget(1), 1);
        assert_eq!(retry_budget(2), 2);
        assert_eq!(retry_budget(4), 2);
        assert_eq!(retry_budget(9), 2);
    }

    #[test]
    fn command_value_display() {
        assert_eq!(CommandValue::Bool(true).to_string(), "true");
        assert_eq!(CommandValue::Number(-5.0).to_string(), "-5");
        assert_eq!(CommandValue::Number(-30.5).to_string(), "-30.5");
        assert_eq!(CommandValue::from("PHONO").to_string(), "PHONO");
    }

    #[test]
    fn command_value_accessors() {
        assert_eq!(CommandValue::from(true).as_bool(), Some(true));
        assert_eq!(CommandValue::from(3).as_f64(), Some(3.0));
        assert_eq!(CommandValue::from("x").as_str(), Some("x"));
        assert_eq!(CommandValue::from(3).as_str(), None);
    }

    #[test]
    fn bounds_contains() {
        let b = ValueBounds::new(-80.0, 18.0);
        assert!(b.contains(-80.0));
        assert!(b.contains(18.0));
        assert!(!b.contains(18.5));
    }

    #[test]
    fn connection_state_round_trip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
        ] {
            let parsed: ConnectionState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("bogus".parse::<ConnectionState>().is_err());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
