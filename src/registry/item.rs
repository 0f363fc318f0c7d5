use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::remote_client::{ItemKind, RemoteEntry};

/// Id of the synthesized root folder
pub const ROOT_ID: &str = "";

/// Id of the synthesized trash folder
pub const TRASH_ID: &str = "trash";

/// Display name of the trash folder
pub const TRASH_NAME: &str = ".trash";

/// True for the two synthesized folders
pub fn is_virtual_id(id: &str) -> bool {
    id == ROOT_ID || id == TRASH_ID
}

/// A node of the remote store's flat namespace.
///
/// The parent is held as an id and only ever resolved through the registry,
/// so an item never keeps another item alive and the tree cannot form
/// reference cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub version: u64,
    /// `None` only for the root folder
    pub parent: Option<String>,
    pub mtime: DateTime<Utc>,
    pub kind: ItemKind,
    pub trashed: bool,
}

impl Item {
    pub fn root() -> Self {
        Self::virtual_folder(ROOT_ID, "", None)
    }

    pub fn trash() -> Self {
        Self::virtual_folder(TRASH_ID, TRASH_NAME, Some(ROOT_ID.to_string()))
    }

    /// Resolve `id` if it names a virtual folder
    pub fn virtual_by_id(id: &str) -> Option<Self> {
        match id {
            ROOT_ID => Some(Self::root()),
            TRASH_ID => Some(Self::trash()),
            _ => None,
        }
    }

    fn virtual_folder(id: &str, name: &str, parent: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: 0,
            parent,
            mtime: Utc::now(),
            kind: ItemKind::Folder,
            trashed: false,
        }
    }

    pub fn is_virtual(&self) -> bool {
        is_virtual_id(&self.id)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    pub fn is_document(&self) -> bool {
        self.kind == ItemKind::Document
    }

    /// True when `self` and `entry` describe the same version of the same item
    pub fn same_version(&self, entry: &RemoteEntry) -> bool {
        self.id == entry.id && self.version == entry.version
    }
}

impl From<RemoteEntry> for Item {
    fn from(entry: RemoteEntry) -> Self {
        // trash membership is the flag; a listing that files items under the
        // trash folder instead of flagging them means the same thing
        let trashed = entry.trashed || entry.parent == TRASH_ID;
        Self {
            id: entry.id,
            name: entry.name,
            version: entry.version,
            parent: Some(entry.parent),
            mtime: entry.mtime,
            kind: entry.kind,
            trashed,
        }
    }
}
