//! Error types for the AMI client

use crate::message::AmiMessage;
use thiserror::Error;

/// Result type alias using [`AmiError`]
pub type AmiResult<T> = Result<T, AmiError>;

/// Stable classification of an [`AmiError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid connection parameters.
    Config,
    /// Handshake deadline exceeded.
    ConnTimeout,
    /// Socket closed, EOF, broken pipe, or reader gone.
    Network,
    /// Connected peer did not greet as Asterisk.
    InvalidPrompt,
    /// Login rejected.
    LoginFailed,
    /// Command could not be rendered to the wire.
    Encode,
    /// Action answered with `Response: Error`.
    Server,
    /// Caller cancelled or session closed during a call.
    Cancelled,
    /// Malformed inbound frame.
    Protocol,
    /// Other I/O failure.
    Io,
    /// JSON conversion failure.
    Json,
}

/// Unified error type for AMI operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// Invalid network, empty host, bad port, missing credentials.
    #[error("configuration error: {0}")]
    Config(String),

    /// Banner or login did not complete in time.
    #[error("connection timed out after {timeout_ms}ms")]
    ConnTimeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The connection is gone.
    #[error("network error: {0}")]
    Network(String),

    /// Connected, but the first line was not the Asterisk banner.
    #[error("invalid prompt: {line:?}")]
    InvalidPrompt {
        /// Line received instead of the banner.
        line: String,
    },

    /// `Response` to `Login` was not `Success`.
    #[error("login failed: {message}")]
    LoginFailed {
        /// `Message` header of the rejection.
        message: String,
    },

    /// Unsupported payload or missing required field.
    #[error("cannot encode command: {why}")]
    Encode {
        /// What made the command unencodable.
        why: String,
    },

    /// Action replied `Response: Error`.
    #[error("server error ({response}): {message}")]
    Server {
        /// Value of the `Response` header.
        response: String,
        /// Value of the `Message` header.
        message: String,
    },

    /// Cancelled by the caller or by session shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Header line without a `:` separator.
    #[error("invalid header line: {header:?}")]
    InvalidHeader {
        /// Offending line.
        header: String,
    },

    /// Any other violation of the framing rules.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description.
        message: String,
    },

    /// I/O error not classified as a connection loss.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AmiError {
    /// Construct a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        AmiError::Protocol {
            message: message.into(),
        }
    }

    /// Construct an encoding error.
    pub fn encode_error(why: impl Into<String>) -> Self {
        AmiError::Encode { why: why.into() }
    }

    /// Construct a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        AmiError::Config(message.into())
    }

    /// Classify an I/O error, folding every flavour of lost connection into
    /// [`AmiError::Network`].
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let closed = matches!(
            err.kind(),
            Io::UnexpectedEof
                | Io::BrokenPipe
                | Io::ConnectionReset
                | Io::ConnectionAborted
                | Io::NotConnected
        );
        let text = err.to_string();
        if closed || text == "EOF" || text == "io: read/write on closed pipe" {
            AmiError::Network(text)
        } else {
            AmiError::Io(err)
        }
    }

    /// Build a [`AmiError::Server`] from an error reply.
    pub fn from_reply(reply: &AmiMessage) -> Self {
        AmiError::Server {
            response: reply
                .response()
                .unwrap_or_default()
                .to_string(),
            message: reply
                .message()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmiError::Config(_) => ErrorKind::Config,
            AmiError::ConnTimeout { .. } => ErrorKind::ConnTimeout,
            AmiError::Network(_) => ErrorKind::Network,
            AmiError::InvalidPrompt { .. } => ErrorKind::InvalidPrompt,
            AmiError::LoginFailed { .. } => ErrorKind::LoginFailed,
            AmiError::Encode { .. } => ErrorKind::Encode,
            AmiError::Server { .. } => ErrorKind::Server,
            AmiError::Cancelled => ErrorKind::Cancelled,
            AmiError::InvalidHeader { .. } | AmiError::Protocol { .. } => ErrorKind::Protocol,
            AmiError::Io(_) => ErrorKind::Io,
            AmiError::Json(_) => ErrorKind::Json,
        }
    }

    /// `true` for the connection-lost sentinel.
    pub fn is_network(&self) -> bool {
        matches!(self, AmiError::Network(_))
    }

    /// `true` when the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AmiError::Cancelled)
    }

    /// Failures worth another attempt on the same session.
    ///
    /// A lost connection is not transient: every later attempt on the
    /// session fails the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            AmiError::ConnTimeout { .. } => true,
            AmiError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// A list action that ended early, with whatever items arrived before the
/// terminal error.
#[derive(Debug, Error)]
#[error("list action interrupted after {} item(s): {source}", .partial.len())]
pub struct ListError {
    /// Accepted events collected before the failure.
    pub partial: Vec<AmiMessage>,
    /// Terminal error.
    #[source]
    pub source: AmiError,
}

impl ListError {
    /// Split into partial data and the terminal error.
    pub fn into_parts(self) -> (Vec<AmiMessage>, AmiError) {
        (self.partial, self.source)
    }
}

impl From<ListError> for AmiError {
    fn from(err: ListError) -> Self {
        err.source
    }
}
