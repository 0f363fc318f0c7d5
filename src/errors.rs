//! Error taxonomy shared by every component of the crate.

use thiserror::Error;

/// Errors surfaced by the registry, the caches, the auth manager and both
/// calling conventions of the client.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {id}: expected version {expected}, remote has {actual:?}")]
    Conflict {
        id: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Blocking call made from inside an active async context")]
    ReentrantCall,

    #[error("Remote call failed: {0}")]
    Transport(String),

    #[error("Cannot modify virtual item: {0}")]
    VirtualItem(String),

    #[error("Item {id} is not a {expected}")]
    InvalidKind { id: String, expected: &'static str },

    #[error("Cannot move {id} into {destination}: destination is the item or one of its descendants")]
    InvalidMove { id: String, destination: String },

    #[error("No rendering collaborator is configured")]
    RendererUnavailable,

    #[error("Persistent store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CloudError {
    /// Wrap any displayable collaborator failure as a transport error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        CloudError::Transport(err.to_string())
    }

    /// True when the remote rejected the credential that accompanied a call.
    pub fn is_auth(&self) -> bool {
        matches!(self, CloudError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
