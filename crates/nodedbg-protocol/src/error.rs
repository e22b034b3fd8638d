use std::io;

use thiserror::Error;

pub type Result<T, E = DebuggerError> = std::result::Result<T, E>;

/// Failures surfaced to the issuer of a command.
///
/// Everything except [`DebuggerError::Cancelled`], [`DebuggerError::ChannelClosed`] and
/// [`DebuggerError::ConnectionClosed`] is local to one command: the channel keeps serving every
/// other pending and future command.
#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The debuggee's reply does not have the expected envelope/body shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for debuggee reply")]
    Timeout,

    /// The channel was torn down while the command was pending.
    #[error("command cancelled")]
    Cancelled,

    /// A command was sent after the channel was torn down.
    #[error("command channel is closed")]
    ChannelClosed,

    #[error("debuggee connection closed")]
    ConnectionClosed,

    /// The debuggee replied with `"success": false`.
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DebuggerError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
