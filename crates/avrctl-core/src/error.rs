//! Error types for avrctl.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Only connect failures and programmer
//! errors surface here: commands that expire or exhaust their retries
//! resolve to `None` rather than failing.

/// The error type for all avrctl operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error on the TCP stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The TCP connect did not complete within the configured timeout.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// The TCP connect was refused or otherwise failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// A command was submitted with a QoS tier the queue does not have.
    #[error("qos {qos} out of range (queue has {levels} tiers)")]
    QosOutOfRange {
        /// The requested QoS tier.
        qos: u8,
        /// Number of tiers configured on the queue.
        levels: u8,
    },

    /// A numeric wire value could not be converted to decibels.
    #[error("unparsable value: {0:?}")]
    UnparsableValue(String),

    /// No command with this name exists in the lookup table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// An invalid parameter was passed to a command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the receiver has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the receiver was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The receiver stopped answering heartbeat queries.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
