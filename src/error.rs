//! Error types and handling.

use thiserror::Error;

/// The four timeout classes called out in the protocol's timer design.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    #[error("timeout writing message")]
    WritingMessage,
    #[error("timeout waiting for request-data response")]
    ReceivingRequestData,
    #[error("timeout waiting for response after requesting data")]
    ReceivingResponseAfterRequest,
    #[error("timeout while receiving a bulk-transfer packet")]
    ReceivingPacket,
}

/// Errors raised by the transport and client layers.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No socket, or the device refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// Local UDP bind collided with an existing socket (not fatal for UDP).
    #[error("address already in use: {0}")]
    AddrInUse(String),

    /// One of the four protocol timeout classes elapsed.
    #[error("{kind}")]
    Timeout {
        kind: TimeoutKind,
        /// Partial bytes already received at the time of the timeout, if any.
        partial: Option<Vec<u8>>,
    },

    /// Parameters failed validation before being sent to the device.
    #[error("invalid input parameters: {0}")]
    InvalidInput(String),

    /// A UDP-only client invoked a TCP-only operation, or vice versa.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Response carried a commandId the caller did not expect.
    #[error("unhandled command: {0}")]
    UnhandledCommand(String),

    /// Malformed frame, bad checksum, short payload, etc.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The socket was closed while a caller was awaiting a reply.
    #[error("socket disconnected unexpectedly")]
    Disconnected {
        /// Partial bytes already received at the time of the close, if any.
        partial: Option<Vec<u8>>,
    },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unhandled_command(cmd: u16) -> Self {
        Self::UnhandledCommand(crate::command::command_name(cmd).to_string())
    }
}

/// Error wrapped with the device address and originating command, as every
/// public [`crate::Client`] method does before returning to its caller.
#[derive(Error, Debug)]
#[error("{command} ({ip}): {source}")]
pub struct ContextError {
    pub ip: String,
    pub command: &'static str,
    #[source]
    pub source: ClientError,
}

impl ClientError {
    /// Attach device/command context, matching `forwardingWrapper`'s
    /// rethrow-with-context policy.
    pub fn with_context(self, ip: impl Into<String>, command: &'static str) -> ContextError {
        ContextError {
            ip: ip.into(),
            command,
            source: self,
        }
    }
}
