//! The suspending form of every operation.
//!
//! [`Client`] is the one implementation of the system's behaviour; the
//! blocking facade in [`crate::blocking`] drives these same futures to
//! completion.

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

use crate::app_state::{AppState, app_state_factory};
use crate::auth::auth_manager::AuthState;
use crate::auth::prompt::RegistrationPrompt;
use crate::cache::content_cache::{ContentHandle, ContentKey, ContentKind};
use crate::cache::property_cache::{
    PROPERTY_ANNOTATED_SIZE, PROPERTY_RAW_SIZE, PROPERTY_SIZE, PROPERTY_TYPE,
};
use crate::config::ProjectConfig;
use crate::errors::{CloudError, Result};
use crate::registry::item::{Item, TRASH_ID, is_virtual_id};
use crate::registry::snapshot::Snapshot;
use crate::remote::remote_client::{FileType, ItemKind, MetadataUpdate, RemoteDirectoryClient};

/// Async client over the remote store
#[derive(Clone)]
pub struct Client {
    state: AppState,
}

impl Client {
    /// Open the property store, load the device credential and wire up a session
    pub async fn connect(
        project_config: ProjectConfig,
        remote: Arc<dyn RemoteDirectoryClient>,
        prompt: Arc<dyn RegistrationPrompt>,
    ) -> Result<Self> {
        let state = app_state_factory(project_config, remote, prompt).await?;
        info!("🚀 Client connected");
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Close the property store; the client is unusable afterwards
    pub async fn close(&self) {
        self.state.persistency_manager.close().await;
    }

    // Registry

    pub async fn get_by_id(&self, id: &str) -> Result<Arc<Item>> {
        self.state.registry.get_by_id(id).await
    }

    pub fn invalidate_cache(&self) {
        self.state.registry.invalidate_cache();
    }

    pub async fn refresh(&self) -> Result<()> {
        self.state.registry.refresh().await
    }

    /// The current snapshot, refreshed first if stale
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.state.registry.current().await
    }

    // Tree

    pub async fn children(&self, folder_id: &str) -> Result<Vec<Arc<Item>>> {
        self.state.tree.children(folder_id).await
    }

    pub async fn parent_of(&self, item: &Item) -> Result<Option<Arc<Item>>> {
        self.state.tree.parent_of(item).await
    }

    // Derived properties

    /// Cached value of `property` for `item_id` at `version`, computed on a miss
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.state
            .property_cache
            .get_or_compute(item_id, version, property, compute)
            .await
    }

    /// Format of the document. An `Unknown` verdict is not cached.
    pub async fn document_type(&self, item: &Item) -> Result<FileType> {
        require_document(item)?;
        let gateway = &self.state.gateway;
        let cache = &self.state.property_cache;
        cache
            .get_or_compute_if(
                &item.id,
                item.version,
                PROPERTY_TYPE,
                || async move {
                    let details = gateway.document_details(&item.id).await?;
                    // the same answer carries the size
                    if let Some(size) = details.size {
                        cache.store(&item.id, item.version, PROPERTY_SIZE, &size).await?;
                    }
                    Ok(details.file_type)
                },
                |file_type| *file_type != FileType::Unknown,
            )
            .await
    }

    /// Size of the packaged document
    pub async fn raw_size(&self, item: &Item) -> Result<u64> {
        require_document(item)?;
        let gateway = &self.state.gateway;
        self.state
            .property_cache
            .get_or_compute(&item.id, item.version, PROPERTY_RAW_SIZE, || async move {
                gateway.raw_size(&item.id).await
            })
            .await
    }

    /// Size of the primary content, or of the package when that is unknown
    pub async fn size(&self, item: &Item) -> Result<u64> {
        require_document(item)?;
        let gateway = &self.state.gateway;
        let cache = &self.state.property_cache;
        cache
            .get_or_compute(&item.id, item.version, PROPERTY_SIZE, || async move {
                let details = gateway.document_details(&item.id).await?;
                if details.file_type != FileType::Unknown {
                    cache
                        .store(&item.id, item.version, PROPERTY_TYPE, &details.file_type)
                        .await?;
                }
                match details.size {
                    Some(size) => Ok(size),
                    None => self.raw_size(item).await,
                }
            })
            .await
    }

    /// Size of the last annotated rendering of this version, else [`size`](Self::size)
    pub async fn annotated_size(&self, item: &Item) -> Result<u64> {
        require_document(item)?;
        let recorded = self
            .state
            .property_cache
            .peek(&item.id, item.version, PROPERTY_ANNOTATED_SIZE)
            .await?;
        match recorded {
            Some(size) => Ok(size),
            None => self.size(item).await,
        }
    }

    // Content

    pub async fn fetch_raw(&self, item: &Item) -> Result<ContentHandle> {
        require_document(item)?;
        let key = ContentKey::new(&item.id, item.version, ContentKind::Raw);
        if let Some(handle) = self.state.content_cache.get(&key) {
            return Ok(handle);
        }
        let bytes = self.state.gateway.read_raw(&item.id).await?;
        Ok(self.state.content_cache.insert(key, bytes))
    }

    pub async fn fetch_contents(&self, item: &Item) -> Result<ContentHandle> {
        require_document(item)?;
        let key = ContentKey::new(&item.id, item.version, ContentKind::Contents);
        if let Some(handle) = self.state.content_cache.get(&key) {
            return Ok(handle);
        }
        let bytes = self.state.gateway.read_content(&item.id).await?;
        Ok(self.state.content_cache.insert(key, bytes))
    }

    /// Rendering with annotations; needs a rendering collaborator
    pub async fn fetch_annotated(&self, item: &Item) -> Result<ContentHandle> {
        require_document(item)?;
        if !self.state.gateway.supports_annotated() {
            return Err(CloudError::RendererUnavailable);
        }
        let key = ContentKey::new(&item.id, item.version, ContentKind::Annotated);
        if let Some(handle) = self.state.content_cache.get(&key) {
            return Ok(handle);
        }
        let bytes = self.state.gateway.render_annotated(&item.id).await?;
        self.state
            .property_cache
            .store(
                &item.id,
                item.version,
                PROPERTY_ANNOTATED_SIZE,
                &(bytes.len() as u64),
            )
            .await?;
        Ok(self.state.content_cache.insert(key, bytes))
    }

    // Writes

    /// Create an item inside `parent_id` and make it resolvable right away
    pub async fn create(&self, parent_id: &str, name: &str, kind: ItemKind) -> Result<Arc<Item>> {
        if parent_id == TRASH_ID {
            return Err(CloudError::VirtualItem(parent_id.to_string()));
        }
        let parent = self.get_by_id(parent_id).await?;
        if !parent.is_folder() {
            return Err(CloudError::InvalidKind {
                id: parent_id.to_string(),
                expected: "folder",
            });
        }

        let created = self.state.gateway.create(parent_id, name, kind).await?;
        info!("📄 Created {} {} in {:?}", kind.as_str(), created.id, parent_id);

        let installed = self.state.registry.install_item(Item {
            id: created.id,
            name: name.to_string(),
            version: created.version,
            parent: Some(parent_id.to_string()),
            mtime: Utc::now(),
            kind,
            trashed: false,
        });
        self.state.registry.invalidate_cache();
        Ok(installed)
    }

    /// Change metadata of `id` if the remote is still at `expected_version`.
    ///
    /// Returns the new version. On a conflict nothing local changes.
    pub async fn update_metadata(
        &self,
        id: &str,
        fields: &MetadataUpdate,
        expected_version: u64,
    ) -> Result<u64> {
        reject_virtual(id)?;
        let version = self
            .state
            .gateway
            .update_metadata(id, fields, expected_version)
            .await?;
        debug!("✏️ Updated metadata of {}: version {} -> {}", id, expected_version, version);
        self.state.registry.invalidate_cache();
        Ok(version)
    }

    pub async fn rename(&self, item: &Item, name: &str) -> Result<u64> {
        self.update_metadata(&item.id, &MetadataUpdate::rename(name), item.version)
            .await
    }

    /// Move `item` into `new_parent_id`; moving into trash also flags it trashed
    pub async fn move_item(&self, item: &Item, new_parent_id: &str) -> Result<u64> {
        reject_virtual(&item.id)?;
        let destination = self.get_by_id(new_parent_id).await?;
        if !destination.is_folder() {
            return Err(CloudError::InvalidKind {
                id: new_parent_id.to_string(),
                expected: "folder",
            });
        }
        if item.is_folder() && self.state.tree.is_same_or_ancestor(&item.id, new_parent_id).await? {
            return Err(CloudError::InvalidMove {
                id: item.id.clone(),
                destination: new_parent_id.to_string(),
            });
        }

        let mut fields = MetadataUpdate::move_to(new_parent_id);
        if new_parent_id == TRASH_ID {
            fields.trashed = Some(true);
        } else if item.trashed {
            fields.trashed = Some(false);
        }
        self.update_metadata(&item.id, &fields, item.version).await
    }

    /// Move `item` to trash, or delete it for good if it or a folder above
    /// it is already there
    pub async fn delete(&self, item: &Item) -> Result<()> {
        reject_virtual(&item.id)?;
        if !self.state.tree.is_in_trash(item).await? {
            self.update_metadata(&item.id, &MetadataUpdate::trash(), item.version)
                .await?;
            info!("🗑️ Moved {} to trash", item.id);
            return Ok(());
        }

        self.state.gateway.delete(&item.id, item.version).await?;
        info!("🗑️ Deleted {} permanently", item.id);
        self.state.registry.invalidate_cache();
        Ok(())
    }

    /// Replace the packaged content of `id` if the remote is still at `expected_version`
    pub async fn upload_content(&self, id: &str, bytes: &[u8], expected_version: u64) -> Result<u64> {
        reject_virtual(id)?;
        let version = self
            .state
            .gateway
            .upload_content(id, bytes, expected_version)
            .await?;
        debug!("⬆️ Uploaded {} bytes to {}: version {}", bytes.len(), id, version);
        self.state.registry.invalidate_cache();
        Ok(version)
    }

    // Auth

    pub async fn register_device(&self, code: &str) -> Result<()> {
        self.state.gateway.register_device(code).await
    }

    pub async fn auth_state(&self) -> AuthState {
        self.state.auth.state().await
    }
}

fn require_document(item: &Item) -> Result<()> {
    if item.is_document() {
        Ok(())
    } else {
        Err(CloudError::InvalidKind {
            id: item.id.clone(),
            expected: "document",
        })
    }
}

fn reject_virtual(id: &str) -> Result<()> {
    if is_virtual_id(id) {
        Err(CloudError::VirtualItem(id.to_string()))
    } else {
        Ok(())
    }
}
