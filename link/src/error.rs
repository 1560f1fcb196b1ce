//! Error types for the logdb-link client library.

use thiserror::Error;

/// Everything that can go wrong talking to a logdb server.
#[derive(Debug, Error)]
pub enum LogDbError {
    /// The server rejected the login credentials.
    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    /// The host could not be resolved or reached.
    #[error("connection failed: {0}")]
    ConnectError(String),

    /// The server answered with an error envelope.
    #[error("server error [{code}]: {message}")]
    RemoteError { code: String, message: String },

    /// No query with this id is registered in the session.
    #[error("no such query: {0}")]
    QueryNotFound(u64),

    /// HTTP transport failure.
    #[error("transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The server's response did not match the wire protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    TimeoutError(String),

    /// The client was built with missing or invalid options.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

pub type Result<T> = std::result::Result<T, LogDbError>;
