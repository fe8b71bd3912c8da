//! Error types shared across the crate.
//!
//! Each layer owns one enum: [`TokenError`] for claim decoding,
//! [`StorageError`] for the durable token slot, [`AuthError`] for store
//! operations and the authentication backend, and [`ChannelError`] for the
//! realtime transport.

use thiserror::Error;

/// Failure to turn a bearer token into a usable identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token is not `header.payload[.signature]`.
    #[error("token is not in compact form")]
    Malformed,

    /// A token segment is not valid base64url.
    #[error("token segment is not valid base64url: {0}")]
    Base64(String),

    /// The header or payload segment is not the expected JSON.
    #[error("token segment is not the expected JSON: {0}")]
    Json(String),

    /// A claim required to build a session is absent.
    #[error("token is missing the `{0}` claim")]
    MissingClaim(&'static str),

    /// The token's expiry is not in the future.
    #[error("token has expired")]
    Expired,
}

/// Failure reading or writing the persisted token slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The underlying database or storage medium failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type of store operations and backend calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// The backend refused the request. The payload is passed through verbatim.
    #[error("request rejected with status {status}")]
    Rejected {
        /// HTTP status code of the rejection.
        status: u16,
        /// Error body returned by the backend.
        payload: serde_json::Value,
    },

    /// The supplied token was not accepted (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The backend handed back a token that cannot be decoded.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The token slot could not be written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::Protocol(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

/// Failure on the realtime push channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Opening the underlying connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The server rejected the protocol handshake.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// A frame could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The join invocation completed with an error.
    #[error("join rejected: {0}")]
    Join(String),

    /// The connection dropped.
    #[error("connection closed: {0}")]
    Closed(String),
}
