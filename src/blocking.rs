//! Blocking form of the client.
//!
//! Each call drives the matching [`Client`] future to completion on a
//! runtime owned by the [`BlockingClient`]. Calling in from a thread that is
//! already inside a Tokio runtime fails with [`CloudError::ReentrantCall`]
//! instead of deadlocking or panicking.

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::auth::auth_manager::AuthState;
use crate::auth::prompt::RegistrationPrompt;
use crate::cache::content_cache::ContentHandle;
use crate::client::Client;
use crate::config::ProjectConfig;
use crate::errors::{CloudError, Result};
use crate::registry::item::Item;
use crate::registry::snapshot::Snapshot;
use crate::remote::remote_client::{FileType, ItemKind, MetadataUpdate, RemoteDirectoryClient};

pub struct BlockingClient {
    runtime: Option<Runtime>,
    client: Client,
}

/// Fail when the calling thread is inside a Tokio runtime
fn ensure_blocking_allowed() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(CloudError::ReentrantCall);
    }
    Ok(())
}

impl BlockingClient {
    /// Build the private runtime and connect a [`Client`] on it
    pub fn connect(
        project_config: ProjectConfig,
        remote: Arc<dyn RemoteDirectoryClient>,
        prompt: Arc<dyn RegistrationPrompt>,
    ) -> Result<Self> {
        ensure_blocking_allowed()?;

        let worker_threads = project_config.settings.blocking_worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("rmcloud-blocking")
            .enable_all()
            .build()?;
        info!("🧵 Blocking client runtime started with {} workers", worker_threads);

        let client = runtime.block_on(Client::connect(project_config, remote, prompt))?;
        Ok(Self {
            runtime: Some(runtime),
            client,
        })
    }

    /// The async client this facade drives
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn run<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        ensure_blocking_allowed()?;
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| CloudError::Config("Blocking runtime already shut down".to_string()))?;
        runtime.block_on(future)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Arc<Item>> {
        self.run(self.client.get_by_id(id))
    }

    pub fn invalidate_cache(&self) {
        self.client.invalidate_cache();
    }

    pub fn refresh(&self) -> Result<()> {
        self.run(self.client.refresh())
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.run(self.client.snapshot())
    }

    pub fn children(&self, folder_id: &str) -> Result<Vec<Arc<Item>>> {
        self.run(self.client.children(folder_id))
    }

    pub fn parent_of(&self, item: &Item) -> Result<Option<Arc<Item>>> {
        self.run(self.client.parent_of(item))
    }

    pub fn get_or_compute<T, F, Fut>(
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
        self.run(
            self.client
                .get_or_compute(item_id, version, property, compute),
        )
    }

    pub fn document_type(&self, item: &Item) -> Result<FileType> {
        self.run(self.client.document_type(item))
    }

    pub fn raw_size(&self, item: &Item) -> Result<u64> {
        self.run(self.client.raw_size(item))
    }

    pub fn size(&self, item: &Item) -> Result<u64> {
        self.run(self.client.size(item))
    }

    pub fn annotated_size(&self, item: &Item) -> Result<u64> {
        self.run(self.client.annotated_size(item))
    }

    pub fn fetch_raw(&self, item: &Item) -> Result<ContentHandle> {
        self.run(self.client.fetch_raw(item))
    }

    pub fn fetch_contents(&self, item: &Item) -> Result<ContentHandle> {
        self.run(self.client.fetch_contents(item))
    }

    pub fn fetch_annotated(&self, item: &Item) -> Result<ContentHandle> {
        self.run(self.client.fetch_annotated(item))
    }

    pub fn create(&self, parent_id: &str, name: &str, kind: ItemKind) -> Result<Arc<Item>> {
        self.run(self.client.create(parent_id, name, kind))
    }

    pub fn update_metadata(
        &self,
        id: &str,
        fields: &MetadataUpdate,
        expected_version: u64,
    ) -> Result<u64> {
        self.run(self.client.update_metadata(id, fields, expected_version))
    }

    pub fn rename(&self, item: &Item, name: &str) -> Result<u64> {
        self.run(self.client.rename(item, name))
    }

    pub fn move_item(&self, item: &Item, new_parent_id: &str) -> Result<u64> {
        self.run(self.client.move_item(item, new_parent_id))
    }

    pub fn delete(&self, item: &Item) -> Result<()> {
        self.run(self.client.delete(item))
    }

    pub fn upload_content(&self, id: &str, bytes: &[u8], expected_version: u64) -> Result<u64> {
        self.run(self.client.upload_content(id, bytes, expected_version))
    }

    pub fn register_device(&self, code: &str) -> Result<()> {
        self.run(self.client.register_device(code))
    }

    pub fn auth_state(&self) -> Result<AuthState> {
        self.run(async { Ok(self.client.auth_state().await) })
    }

    pub fn close(&self) -> Result<()> {
        self.run(async {
            self.client.close().await;
            Ok(())
        })
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("🛑 Shutting down blocking client runtime");
            runtime.shutdown_background();
        }
    }
}
