use log::{debug, error};
use std::future::Future;
use std::sync::Arc;

use crate::auth::auth_manager::AuthManager;
use crate::errors::Result;
use crate::remote::remote_client::{
    DocumentDetails, ItemKind, MetadataUpdate, NewItem, RemoteDirectoryClient, RemoteEntry,
};

/// Every remote call the core makes goes through here.
///
/// The gateway asks the auth manager for a user token before each call and
/// hands a rejected token back to it, so the next call re-exchanges. Nothing
/// is retried here; retry policy belongs to the caller.
#[derive(Clone)]
pub struct RemoteGateway {
    remote: Arc<dyn RemoteDirectoryClient>,
    auth: Arc<AuthManager>,
}

impl RemoteGateway {
    pub fn new(remote: Arc<dyn RemoteDirectoryClient>, auth: Arc<AuthManager>) -> Self {
        Self { remote, auth }
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn remote(&self) -> &Arc<dyn RemoteDirectoryClient> {
        &self.remote
    }

    async fn authorized<'a, T, F, Fut>(&'a self, operation: &str, call: F) -> Result<T>
    where
        F: FnOnce(&'a dyn RemoteDirectoryClient, String) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let token = self.auth.user_token(self.remote.as_ref()).await?;
        debug!("📡 Remote call: {}", operation);

        match call(self.remote.as_ref(), token.clone()).await {
            Err(e) if e.is_auth() => {
                self.auth.invalidate_user_token(&token).await;
                Err(e)
            }
            Err(e) => {
                error!("❌ Remote call {} failed: {}", operation, e);
                Err(e)
            }
            ok => ok,
        }
    }

    pub async fn list(&self) -> Result<Vec<RemoteEntry>> {
        self.authorized("list", |remote, token| async move { remote.list(&token).await })
            .await
    }

    pub async fn read_raw(&self, id: &str) -> Result<Vec<u8>> {
        self.authorized("read_raw", |remote, token| async move {
            remote.read_raw(&token, id).await
        })
        .await
    }

    pub async fn read_content(&self, id: &str) -> Result<Vec<u8>> {
        self.authorized("read_content", |remote, token| async move {
            remote.read_content(&token, id).await
        })
        .await
    }

    pub fn supports_annotated(&self) -> bool {
        self.remote.supports_annotated()
    }

    pub async fn render_annotated(&self, id: &str) -> Result<Vec<u8>> {
        self.authorized("render_annotated", |remote, token| async move {
            remote.render_annotated(&token, id).await
        })
        .await
    }

    pub async fn raw_size(&self, id: &str) -> Result<u64> {
        self.authorized("raw_size", |remote, token| async move {
            remote.raw_size(&token, id).await
        })
        .await
    }

    pub async fn document_details(&self, id: &str) -> Result<DocumentDetails> {
        self.authorized("document_details", |remote, token| async move {
            remote.document_details(&token, id).await
        })
        .await
    }

    pub async fn create(&self, parent_id: &str, name: &str, kind: ItemKind) -> Result<NewItem> {
        self.authorized("create", |remote, token| async move {
            remote.create(&token, parent_id, name, kind).await
        })
        .await
    }

    pub async fn update_metadata(
        &self,
        id: &str,
        fields: &MetadataUpdate,
        expected_version: u64,
    ) -> Result<u64> {
        self.authorized("update_metadata", |remote, token| async move {
            remote
                .update_metadata(&token, id, fields, expected_version)
                .await
        })
        .await
    }

    pub async fn upload_content(&self, id: &str, bytes: &[u8], expected_version: u64) -> Result<u64> {
        self.authorized("upload_content", |remote, token| async move {
            remote
                .upload_content(&token, id, bytes, expected_version)
                .await
        })
        .await
    }

    pub async fn delete(&self, id: &str, expected_version: u64) -> Result<()> {
        self.authorized("delete", |remote, token| async move {
            remote.delete(&token, id, expected_version).await
        })
        .await
    }

    /// Register this device with a code collected by the host
    pub async fn register_device(&self, code: &str) -> Result<()> {
        self.auth.register_device(self.remote.as_ref(), code).await
    }
}
