//! In-memory remote store implementing [`RemoteDirectoryClient`].
//!
//! Used by the test suites and handy for demos: it keeps a flat map of
//! entries, bumps versions on every accepted write, enforces expected
//! versions, issues and validates tokens, and can be told to fail or slow
//! down individual operations.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::errors::{CloudError, Result};
use crate::remote::remote_client::{
    DocumentDetails, FileType, ItemKind, MetadataUpdate, NewItem, RemoteDirectoryClient,
    RemoteEntry,
};

/// Registration code accepted by a fresh mock
pub const MOCK_REGISTRATION_CODE: &str = "abcdefgh";

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<String, RemoteEntry>,
    raw: HashMap<String, Vec<u8>>,
    content: HashMap<String, Vec<u8>>,
    annotated: HashMap<String, Vec<u8>>,
    details: HashMap<String, DocumentDetails>,
    annotations_enabled: bool,
    should_fail_operations: HashSet<String>,
    call_counter: HashMap<String, usize>,
    list_delay: Option<Duration>,
    issued_device_tokens: HashSet<String>,
    issued_user_tokens: HashSet<String>,
    token_counter: u64,
    item_counter: u64,
    registration_code: String,
}

/// Mock implementation of the remote store for testing
#[derive(Clone)]
pub struct MockRemoteClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteClient {
    pub fn new() -> Self {
        let state = MockState {
            registration_code: MOCK_REGISTRATION_CODE.to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a folder at version 1
    pub fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.add_entry(id, name, parent, ItemKind::Folder);
    }

    /// Add a document at version 1
    pub fn add_document(&self, id: &str, name: &str, parent: &str) {
        self.add_entry(id, name, parent, ItemKind::Document);
    }

    fn add_entry(&self, id: &str, name: &str, parent: &str, kind: ItemKind) {
        let entry = RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            parent: parent.to_string(),
            version: 1,
            mtime: Utc::now(),
            kind,
            trashed: false,
        };
        self.lock().entries.insert(id.to_string(), entry);
    }

    /// Insert or replace an entry verbatim
    pub fn put_entry(&self, entry: RemoteEntry) {
        self.lock().entries.insert(entry.id.clone(), entry);
    }

    pub fn remove_entry(&self, id: &str) {
        self.lock().entries.remove(id);
    }

    pub fn entry(&self, id: &str) -> Option<RemoteEntry> {
        self.lock().entries.get(id).cloned()
    }

    /// Simulate a write by another client: bump the version of `id`
    pub fn advance_version(&self, id: &str) -> Option<u64> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(id)?;
        entry.version += 1;
        entry.mtime = Utc::now();
        Some(entry.version)
    }

    pub fn set_raw(&self, id: &str, bytes: &[u8]) {
        self.lock().raw.insert(id.to_string(), bytes.to_vec());
    }

    pub fn set_content(&self, id: &str, bytes: &[u8]) {
        self.lock().content.insert(id.to_string(), bytes.to_vec());
    }

    pub fn set_annotated(&self, id: &str, bytes: &[u8]) {
        self.lock().annotated.insert(id.to_string(), bytes.to_vec());
    }

    pub fn set_details(&self, id: &str, details: DocumentDetails) {
        self.lock().details.insert(id.to_string(), details);
    }

    /// Pretend a rendering collaborator is installed
    pub fn enable_annotations(&self) {
        self.lock().annotations_enabled = true;
    }

    /// Make every call of `operation` fail with a transport error
    pub fn fail_operation(&self, operation: &str) {
        self.lock()
            .should_fail_operations
            .insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().should_fail_operations.clear();
    }

    /// Deliver every listing `delay` after it was taken, so concurrent callers overlap
    pub fn set_list_delay(&self, delay: Duration) {
        self.lock().list_delay = Some(delay);
    }

    /// Reject every user token issued so far
    pub fn revoke_user_tokens(&self) {
        self.lock().issued_user_tokens.clear();
    }

    pub fn set_registration_code(&self, code: &str) {
        self.lock().registration_code = code.to_string();
    }

    /// Number of times `operation` was invoked, failed calls included
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .call_counter
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Count the call, then apply the configured failure and token checks
    fn begin(&self, operation: &str, user_token: Option<&str>) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        *state.call_counter.entry(operation.to_string()).or_insert(0) += 1;

        if state.should_fail_operations.contains(operation) {
            return Err(CloudError::transport(format!("Mock {} failure", operation)));
        }
        if let Some(token) = user_token {
            if !state.issued_user_tokens.contains(token) {
                return Err(CloudError::Auth(format!("user token rejected by {}", operation)));
            }
        }
        Ok(state)
    }

    fn blob(map: &HashMap<String, Vec<u8>>, entries: &HashMap<String, RemoteEntry>, id: &str) -> Result<Vec<u8>> {
        if !entries.contains_key(id) {
            return Err(CloudError::NotFound(id.to_string()));
        }
        Ok(map.get(id).cloned().unwrap_or_default())
    }

    fn check_version(entry: &RemoteEntry, expected_version: u64) -> Result<()> {
        if entry.version != expected_version {
            return Err(CloudError::Conflict {
                id: entry.id.clone(),
                expected: expected_version,
                actual: Some(entry.version),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDirectoryClient for MockRemoteClient {
    async fn list(&self, user_token: &str) -> Result<Vec<RemoteEntry>> {
        // the listing reflects the store when it was requested, not when it arrives
        let delay = self.lock().list_delay;
        let listing = self
            .begin("list", Some(user_token))
            .map(|state| state.entries.values().cloned().collect());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        listing
    }

    async fn read_raw(&self, user_token: &str, id: &str) -> Result<Vec<u8>> {
        let state = self.begin("read_raw", Some(user_token))?;
        Self::blob(&state.raw, &state.entries, id)
    }

    async fn read_content(&self, user_token: &str, id: &str) -> Result<Vec<u8>> {
        let state = self.begin("read_content", Some(user_token))?;
        Self::blob(&state.content, &state.entries, id)
    }

    async fn render_annotated(&self, user_token: &str, id: &str) -> Result<Vec<u8>> {
        let state = self.begin("render_annotated", Some(user_token))?;
        if !state.annotations_enabled {
            return Err(CloudError::RendererUnavailable);
        }
        Self::blob(&state.annotated, &state.entries, id)
    }

    fn supports_annotated(&self) -> bool {
        self.lock().annotations_enabled
    }

    async fn raw_size(&self, user_token: &str, id: &str) -> Result<u64> {
        let state = self.begin("raw_size", Some(user_token))?;
        Self::blob(&state.raw, &state.entries, id).map(|bytes| bytes.len() as u64)
    }

    async fn document_details(&self, user_token: &str, id: &str) -> Result<DocumentDetails> {
        let state = self.begin("document_details", Some(user_token))?;
        if !state.entries.contains_key(id) {
            return Err(CloudError::NotFound(id.to_string()));
        }
        Ok(state.details.get(id).copied().unwrap_or(DocumentDetails {
            file_type: FileType::Unknown,
            size: None,
        }))
    }

    async fn create(
        &self,
        user_token: &str,
        parent_id: &str,
        name: &str,
        kind: ItemKind,
    ) -> Result<NewItem> {
        let mut state = self.begin("create", Some(user_token))?;
        state.item_counter += 1;
        let id = format!("mock-item-{}", state.item_counter);
        let entry = RemoteEntry {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
            version: 1,
            mtime: Utc::now(),
            kind,
            trashed: false,
        };
        state.entries.insert(id.clone(), entry);
        Ok(NewItem { id, version: 1 })
    }

    async fn update_metadata(
        &self,
        user_token: &str,
        id: &str,
        fields: &MetadataUpdate,
        expected_version: u64,
    ) -> Result<u64> {
        let mut state = self.begin("update_metadata", Some(user_token))?;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        Self::check_version(entry, expected_version)?;

        if let Some(name) = &fields.name {
            entry.name = name.clone();
        }
        if let Some(parent) = &fields.parent {
            entry.parent = parent.clone();
        }
        if let Some(trashed) = fields.trashed {
            entry.trashed = trashed;
        }
        entry.version += 1;
        entry.mtime = Utc::now();
        Ok(entry.version)
    }

    async fn upload_content(
        &self,
        user_token: &str,
        id: &str,
        bytes: &[u8],
        expected_version: u64,
    ) -> Result<u64> {
        let mut state = self.begin("upload_content", Some(user_token))?;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        Self::check_version(entry, expected_version)?;
        entry.version += 1;
        entry.mtime = Utc::now();
        let version = entry.version;
        state.raw.insert(id.to_string(), bytes.to_vec());
        Ok(version)
    }

    async fn delete(&self, user_token: &str, id: &str, expected_version: u64) -> Result<()> {
        let mut state = self.begin("delete", Some(user_token))?;
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        Self::check_version(entry, expected_version)?;
        state.entries.remove(id);
        Ok(())
    }

    async fn exchange_device_token(
        &self,
        registration_code: &str,
        device_id: &str,
    ) -> Result<String> {
        let mut state = self.begin("exchange_device_token", None)?;
        if registration_code != state.registration_code {
            return Err(CloudError::Auth("Can't register device".to_string()));
        }
        let token = format!("device-token-{}", device_id);
        state.issued_device_tokens.insert(token.clone());
        Ok(token)
    }

    async fn exchange_user_token(&self, device_token: &str) -> Result<String> {
        let mut state = self.begin("exchange_user_token", None)?;
        if !device_token.starts_with("device-token-") {
            return Err(CloudError::Auth("Can't renew token: 401".to_string()));
        }
        state.token_counter += 1;
        let token = format!("user-token-{}", state.token_counter);
        state.issued_user_tokens.insert(token.clone());
        Ok(token)
    }
}
