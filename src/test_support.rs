//! Shared fixtures for the unit tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::auth_manager::AuthManager;
use crate::auth::prompt::NonInteractive;
use crate::auth::token_store::TokenStore;
use crate::remote::gateway::RemoteGateway;
use crate::remote::mock::{MOCK_REGISTRATION_CODE, MockRemoteClient};

/// Gateway over `mock` with a device already registered under `dir`
pub async fn registered_gateway(dir: &Path, mock: &MockRemoteClient) -> RemoteGateway {
    let store = TokenStore::new(dir, false).unwrap();
    let auth = AuthManager::new(store, Arc::new(NonInteractive), Duration::from_secs(3600)).unwrap();
    let gateway = RemoteGateway::new(Arc::new(mock.clone()), Arc::new(auth));
    gateway.register_device(MOCK_REGISTRATION_CODE).await.unwrap();
    gateway
}
