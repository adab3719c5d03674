//! Error types for the Strand node.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("out of bounds: need {needed} bytes, {remaining} remaining")] OutOfBounds { needed: usize, remaining: usize },
    #[error("pattern not found")] NotFound,
    #[error("value too large: {0}")] ValueTooLarge(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("malformed {command} message: {reason}")] MalformedMessage { command: String, reason: String },
    #[error("checksum mismatch on {command}: expected {expected}, got {actual}")] ChecksumMismatch { command: String, expected: String, actual: String },
    #[error("receive buffer overflow: {size} > {max}")] BufferOverflow { size: usize, max: usize },
    #[error("connected to self")] SelfConnection,
    #[error("command name too long: {0}")] CommandTooLong(String),
    #[error("invalid argument: {0}")] InvalidArgument(String),
    #[error("connection closed")] Closed,
    #[error("io: {0}")] Io(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is not connected")] NotConnected,
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("corrupt record: {0}")] Corrupt(String),
}

#[derive(Error, Debug)]
pub enum StrandError {
    #[error(transparent)] Parse(#[from] ParseError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error("storage: {0}")] Storage(String),
}

impl NetworkError {
    /// Wrap a payload decode failure for `command`.
    pub fn malformed(command: &str, err: ParseError) -> Self {
        NetworkError::MalformedMessage {
            command: command.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether this error ends the session rather than dropping one message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetworkError::BufferOverflow { .. } | NetworkError::SelfConnection | NetworkError::Closed
        )
    }
}
