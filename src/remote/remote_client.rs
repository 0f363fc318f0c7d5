use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Kind discriminant of a remote item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Folder,
    Document,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Folder => "folder",
            ItemKind::Document => "document",
        }
    }
}

/// One row of the remote store's full flat listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub parent: String,
    pub version: u64,
    pub mtime: DateTime<Utc>,
    pub kind: ItemKind,
    pub trashed: bool,
}

/// Identity of an item freshly created on the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: String,
    pub version: u64,
}

/// Metadata fields to change; `None` leaves the field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub parent: Option<String>,
    pub trashed: Option<bool>,
}

impl MetadataUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn move_to(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Default::default()
        }
    }

    pub fn trash() -> Self {
        Self {
            trashed: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.parent.is_none() && self.trashed.is_none()
    }
}

/// Format of a document's primary content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Pdf,
    Epub,
    Notes,
    Unknown,
}

/// Verdict of the format-detection collaborator for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub file_type: FileType,
    /// Size of the primary content when the collaborator can tell it
    pub size: Option<u64>,
}

/// Interface of the remote store.
///
/// Implementations perform the actual network calls. Every call except the two
/// token exchanges receives the current user token; a rejected token must be
/// reported as `CloudError::Auth` so the caller can re-exchange it. Optimistic
/// concurrency violations are reported as `CloudError::Conflict`, any other
/// failure as `CloudError::Transport`.
#[async_trait]
pub trait RemoteDirectoryClient: Send + Sync {
    // Listing
    async fn list(&self, user_token: &str) -> Result<Vec<RemoteEntry>>;

    // Content
    async fn read_raw(&self, user_token: &str, id: &str) -> Result<Vec<u8>>;
    async fn read_content(&self, user_token: &str, id: &str) -> Result<Vec<u8>>;
    async fn render_annotated(&self, user_token: &str, id: &str) -> Result<Vec<u8>>;

    /// Whether a rendering collaborator backs `render_annotated`
    fn supports_annotated(&self) -> bool {
        false
    }

    // Derived property inputs
    async fn raw_size(&self, user_token: &str, id: &str) -> Result<u64>;
    async fn document_details(&self, user_token: &str, id: &str) -> Result<DocumentDetails>;

    // Writes
    async fn create(
        &self,
        user_token: &str,
        parent_id: &str,
        name: &str,
        kind: ItemKind,
    ) -> Result<NewItem>;
    async fn update_metadata(
        &self,
        user_token: &str,
        id: &str,
        fields: &MetadataUpdate,
        expected_version: u64,
    ) -> Result<u64>;
    async fn upload_content(
        &self,
        user_token: &str,
        id: &str,
        bytes: &[u8],
        expected_version: u64,
    ) -> Result<u64>;
    async fn delete(&self, user_token: &str, id: &str, expected_version: u64) -> Result<()>;

    // Credentials
    async fn exchange_device_token(&self, registration_code: &str, device_id: &str)
    -> Result<String>;
    async fn exchange_user_token(&self, device_token: &str) -> Result<String>;
}
