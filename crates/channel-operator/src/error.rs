use std::path::PathBuf;

use thiserror::Error;

/// Failures of the messaging-platform client and its event feed.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{method} rejected: {error}")]
    Api { method: String, error: String },

    #[error("message parse error: {0}")]
    ParseError(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
}

/// Rule configuration could not be read or understood.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing environment variable {0}")]
    MissingVar(String),
}

/// Which kind of identity a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    User,
    Channel,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::User => write!(f, "user"),
            IdentityKind::Channel => write!(f, "channel"),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to resolve {kind} {id}: {source}")]
pub struct IdentityLookupError {
    pub kind: IdentityKind,
    pub id: String,
    #[source]
    pub source: PlatformError,
}

/// A send, whisper or delete did not go through.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery to {target} failed: {source}")]
    Send {
        target: String,
        #[source]
        source: PlatformError,
    },

    #[error("deleting message {ts} in {channel} failed: {source}")]
    Delete {
        channel: String,
        ts: String,
        #[source]
        source: PlatformError,
    },
}

/// Errors raised by the durable audit store.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// The connection dropped or could not be established. Retried.
    #[error("audit store connection lost: {0}")]
    ConnectionLost(String),

    /// Anything else the store reports. Not retried.
    #[error("audit store failure: {0}")]
    Fatal(String),
}

impl PersistenceError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, PersistenceError::ConnectionLost(_))
    }
}
