//! Parent/child views derived from the registry.

use std::sync::Arc;

use crate::errors::{CloudError, Result};
use crate::registry::item::{Item, TRASH_ID, is_virtual_id};
use crate::registry::item_registry::ItemRegistry;

/// Derives folder contents and upward navigation from registry snapshots
pub struct TreeAssembler {
    registry: Arc<ItemRegistry>,
}

impl TreeAssembler {
    pub fn new(registry: Arc<ItemRegistry>) -> Self {
        Self { registry }
    }

    /// Items directly inside `folder_id`, all taken from one snapshot.
    ///
    /// For the trash folder membership is the `trashed` flag instead of the
    /// parent id. The result is unordered.
    pub async fn children(&self, folder_id: &str) -> Result<Vec<Arc<Item>>> {
        let snapshot = self.registry.current().await?;

        if !is_virtual_id(folder_id) {
            let folder = snapshot
                .get(folder_id)
                .ok_or_else(|| CloudError::NotFound(folder_id.to_string()))?;
            if !folder.is_folder() {
                return Err(CloudError::InvalidKind {
                    id: folder_id.to_string(),
                    expected: "folder",
                });
            }
        }

        Ok(snapshot.children_of(folder_id))
    }

    /// Resolve the parent of `item` through the registry; `None` for the root
    pub async fn parent_of(&self, item: &Item) -> Result<Option<Arc<Item>>> {
        match item.parent.as_deref() {
            None => Ok(None),
            Some(parent_id) => self.registry.get_by_id(parent_id).await.map(Some),
        }
    }

    /// True when `ancestor_id` is `item_id` itself or lies on its path to the root
    pub async fn is_same_or_ancestor(&self, ancestor_id: &str, item_id: &str) -> Result<bool> {
        let mut current = self.registry.get_by_id(item_id).await?;
        // bounded by the snapshot size so a malformed listing cannot loop forever
        let limit = self.registry.snapshot().len() + 2;
        for _ in 0..limit {
            if current.id == ancestor_id {
                return Ok(true);
            }
            match self.parent_of(&current).await? {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// True when `item` or any folder above it is trashed or is the trash
    /// folder. A parent that no longer resolves ends the walk.
    pub async fn is_in_trash(&self, item: &Item) -> Result<bool> {
        if item.trashed {
            return Ok(true);
        }
        let limit = self.registry.snapshot().len() + 2;
        let mut next = item.parent.clone();
        for _ in 0..limit {
            let Some(parent_id) = next else {
                return Ok(false);
            };
            if parent_id == TRASH_ID {
                return Ok(true);
            }
            let parent = match self.registry.get_by_id(&parent_id).await {
                Ok(parent) => parent,
                Err(CloudError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            };
            if parent.trashed {
                return Ok(true);
            }
            next = parent.parent.clone();
        }
        Ok(false)
    }
}
