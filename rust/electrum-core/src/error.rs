//! Error kinds and error types.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Inspectable category of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport failed; the session has been (or is being) shut down.
    Transport,
    /// The server answered the request with an error object.
    Protocol,
    /// A payload could not be encoded or decoded.
    Codec,
    /// No response arrived within the request timeout.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
    /// The session is shut down.
    Shutdown,
    /// Caller-supplied parameters were rejected before any I/O.
    Validation,
    /// A lookup key is not tracked.
    NotFound,
    /// Too many requests are in flight.
    ResourceExhausted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Protocol => write!(f, "protocol"),
            Self::Codec => write!(f, "codec"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not found"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
        }
    }
}

/// Transport-level errors. Any error a transport reports is fatal for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Closed,
    Io(IoError),
    LineTooLong { max: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::LineTooLong { max } => write!(f, "inbound line exceeds {max} bytes"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.into())
    }
}

/// Cloneable capture of a `std::io::Error`, so transport failures can be
/// broadcast to several observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoError {
    pub kind: std::io::ErrorKind,
    pub message: String,
}

impl IoError {
    pub fn new(kind: std::io::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for IoError {}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Error object returned by the server for a specific request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, error: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

/// Parameter checks performed before a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The checkpoint height does not lie strictly above every requested height.
    CheckpointHeight { highest: u32, checkpoint: u32 },
    /// The address could not be parsed.
    InvalidAddress(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckpointHeight {
                highest,
                checkpoint,
            } => write!(
                f,
                "checkpoint height {checkpoint} must be greater than height {highest}"
            ),
            Self::InvalidAddress(msg) => write!(f, "invalid address: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// High-level RPC errors.
#[derive(Debug, Clone)]
pub enum RpcError {
    Transport(TransportError),
    Server(ServerError),
    /// Serialization error - contains error message
    Encode(String),
    /// Deserialization error - contains error message
    Decode(String),
    Timeout,
    Cancelled,
    Shutdown,
    /// The transport a request was sent on was replaced before it completed.
    TransportReplaced,
    TooManyPending { max: usize },
    Validation(ValidationError),
    NotSubscribed(String),
    /// One or more script hashes failed to resubscribe.
    Resubscribe(Vec<(String, RpcError)>),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::TransportReplaced => ErrorKind::Transport,
            Self::Server(_) => ErrorKind::Protocol,
            Self::Encode(_) | Self::Decode(_) => ErrorKind::Codec,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Shutdown => ErrorKind::Shutdown,
            Self::TooManyPending { .. } => ErrorKind::ResourceExhausted,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotSubscribed(_) => ErrorKind::NotFound,
            Self::Resubscribe(failures) => failures
                .first()
                .map(|(_, e)| e.kind())
                .unwrap_or(ErrorKind::Protocol),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Server(e) => write!(f, "server error: {e}"),
            Self::Encode(msg) => write!(f, "could not serialize request: {msg}"),
            Self::Decode(msg) => write!(f, "could not deserialize response: {msg}"),
            Self::Timeout => write!(f, "request timeout"),
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Shutdown => write!(f, "session has shut down"),
            Self::TransportReplaced => write!(f, "transport was replaced mid-request"),
            Self::TooManyPending { max } => write!(f, "too many pending requests (max {max})"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::NotSubscribed(key) => write!(f, "not subscribed: {key}"),
            Self::Resubscribe(failures) => {
                write!(f, "{} resubscription(s) failed", failures.len())?;
                for (scripthash, e) in failures {
                    write!(f, "; {scripthash}: {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Server(e) => Some(e),
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ServerError> for RpcError {
    fn from(e: ServerError) -> Self {
        Self::Server(e)
    }
}

impl From<ValidationError> for RpcError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}
