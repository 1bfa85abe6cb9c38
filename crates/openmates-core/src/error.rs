use thiserror::Error;

/// Error taxonomy shared across every crate in the workspace. Variants map
/// 1:1 onto the WebSocket `error.payload.kind` values clients see.
#[derive(Debug, Error)]
pub enum OpenMatesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("version conflict on chat {chat_id}: based_on_version {based_on_version} < server {server_version}")]
    VersionConflict {
        chat_id: String,
        based_on_version: u64,
        server_version: u64,
    },

    #[error("size limit exceeded: {field} is {size} (max {max})")]
    SizeLimit {
        field: String,
        size: usize,
        max: usize,
    },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },

    #[error("key vault unavailable: {0}")]
    KVUnavailable(String),

    #[error("server overloaded, backpressure engaged")]
    Overloaded,

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("invalid ciphertext")]
    InvalidCiphertext,

    #[error("key not found: {key_id}")]
    KeyNotFound { key_id: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OpenMatesError {
    /// Short kind string sent to clients in the WS error frame's
    /// `payload.kind` field (exit/error codes).
    pub fn kind(&self) -> &'static str {
        match self {
            OpenMatesError::Config(_) => "Internal",
            OpenMatesError::VersionConflict { .. } => "VersionConflict",
            OpenMatesError::SizeLimit { .. } => "SizeLimit",
            OpenMatesError::NotAuthenticated => "NotAuthenticated",
            OpenMatesError::NotAuthorized { .. } => "NotAuthorized",
            OpenMatesError::KVUnavailable(_) => "KVUnavailable",
            OpenMatesError::Overloaded => "Overloaded",
            OpenMatesError::NotFound { .. } => "NotFound",
            OpenMatesError::InvalidCiphertext => "Internal",
            OpenMatesError::KeyNotFound { .. } => "Internal",
            OpenMatesError::Malformed(_) => "SizeLimit",
            OpenMatesError::Database(_) => "Internal",
            OpenMatesError::Serialization(_) => "Internal",
            OpenMatesError::Io(_) => "Internal",
            OpenMatesError::Internal(_) => "Internal",
        }
    }

    /// Whether the error is a transient infra failure worth retrying within
    /// the request budget ("Transient infra" policy) rather than
    /// surfacing immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OpenMatesError::KVUnavailable(_) | OpenMatesError::Database(_)
        )
    }

    pub fn database(e: impl std::fmt::Display) -> Self {
        OpenMatesError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpenMatesError>;
