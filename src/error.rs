//! Error types shared by the server and the client.

use thiserror::Error;

/// Result type for keeper operations.
pub type Result<T> = std::result::Result<T, KeeperError>;

/// Errors that can occur anywhere in keeper.
///
/// The first group is the domain taxonomy that the HTTP layer maps to status
/// codes one to one. Everything after it is an internal failure (a 500 on the
/// server) or a client-side condition.
#[derive(Error, Debug)]
pub enum KeeperError {
    /// Registration with a login that already exists.
    #[error("user already exists")]
    UserConflict,

    /// Unknown login or wrong password.
    #[error("invalid login or password")]
    UserDataConflict,

    /// Malformed token, bad signature or wrong algorithm.
    #[error("invalid token")]
    InvalidToken,

    /// Correctly signed token past its expiry.
    #[error("expired token")]
    ExpiredToken,

    /// Request body is malformed or missing required fields.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The mutation worker no longer accepts commands.
    #[error("mutation queue is closed")]
    QueueClosed,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The client has no token yet.
    #[error("not logged in")]
    NotLoggedIn,

    /// The server answered 500.
    #[error("internal server error")]
    InternalServer,

    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),
}

impl KeeperError {
    /// Returns true for failures the caller cannot fix by changing the request.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            KeeperError::UserConflict
                | KeeperError::UserDataConflict
                | KeeperError::InvalidToken
                | KeeperError::ExpiredToken
                | KeeperError::BadRequest(_)
        )
    }
}
