//! Error types for renode-extctl
//!
//! One error enum per layer, from the socket up:
//! - `ConnectError`: address resolution and connection establishment
//! - `HandshakeError`: capability negotiation
//! - `ProtocolError`: malformed frames at the codec level
//! - `DispatchError`: a single request/response exchange
//! - `Error`: domain-level errors surfaced by the handle layer

use thiserror::Error;

/// Result type alias using the domain-level `Error`
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Connection Errors
// =============================================================================

/// Failure to establish a transport connection
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid server address '{0}' (expected host:port)")]
    InvalidAddress(String),

    #[error("Failed to resolve {host}:{port}: {source}")]
    ResolutionFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to connect to {host}:{port} ({attempts} candidate address(es) tried)")]
    AllCandidatesFailed {
        host: String,
        port: u16,
        attempts: usize,
        #[source]
        last_error: Option<std::io::Error>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to set up session: {0}")]
    Worker(#[source] std::io::Error),
}

// =============================================================================
// Handshake Errors
// =============================================================================

/// Failure while negotiating the activation list
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Too many activation entries: {0} (max 65535)")]
    TooManyActivations(usize),

    #[error("Handshake rejected by server (code 0x{code:02x})")]
    Rejected { code: u8 },

    #[error("Connection closed before handshake completed")]
    ConnectionClosed,

    #[error("Handshake already performed on this session")]
    AlreadyNegotiated,

    #[error("Session is not connected")]
    NotConnected,

    #[error("IO error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// Malformed or unexpected bytes at the framing level
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown return code: 0x{0:02x}")]
    UnknownReturnCode(u8),

    #[error("Return code {0:?} is not valid on the command path")]
    UnexpectedReturnCode(crate::protocol::ReturnCode),

    #[error("Unknown command id: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("Bad frame magic: expected 'RE', got {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    #[error("Invalid return code table: {0}")]
    InvalidReturnCodeTable(String),

    #[error("Response frame (code 0x{0:02x}) arrived with no request in flight")]
    UnsolicitedResponse(u8),
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Failure of a single command exchange
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Session is not connected")]
    NotConnected,

    #[error("Handshake has not been performed on this session")]
    NotNegotiated,

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("Command mismatch: expected 0x{expected:02x}, server echoed 0x{echoed:02x}")]
    CommandMismatch { expected: u8, echoed: u8 },

    #[error("Server reported {code:?}: {}", String::from_utf8_lossy(.payload))]
    ServerReported {
        code: crate::protocol::ReturnCode,
        payload: Vec<u8>,
    },

    #[error("Server rejected the command as invalid")]
    InvalidCommand,

    #[error("Unexpected async event for command 0x{command:02x} on the command path")]
    UnexpectedAsyncEvent { command: u8 },

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
}

impl DispatchError {
    /// Whether this failure left the byte stream at an undefined position.
    ///
    /// Fatal errors force the session closed; the caller has to reconnect,
    /// redo the handshake and re-acquire its handles.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::ConnectionClosed
                | DispatchError::TruncatedFrame { .. }
                | DispatchError::CommandMismatch { .. }
                | DispatchError::UnexpectedAsyncEvent { .. }
                | DispatchError::Timeout
                | DispatchError::Protocol(_)
                | DispatchError::Io(_)
        )
    }

    /// Diagnostic text of a `ServerReported` error, decoded lossily
    pub fn message(&self) -> Option<String> {
        match self {
            DispatchError::ServerReported { payload, .. } => {
                Some(String::from_utf8_lossy(payload).into_owned())
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => DispatchError::Timeout,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => DispatchError::ConnectionClosed,
            std::io::ErrorKind::NotConnected => DispatchError::NotConnected,
            _ => DispatchError::Io(err),
        }
    }
}

// =============================================================================
// Domain Errors
// =============================================================================

/// Error type for handle-level operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed reply to {command}: expected {expected} bytes, got {actual}")]
    MalformedReply {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Session has been closed")]
    SessionClosed,

    #[error("Background operation ended without a result")]
    Abandoned,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
