use std::sync::Arc;

use log::info;

use crate::auth::auth_manager::AuthManager;
use crate::auth::prompt::RegistrationPrompt;
use crate::auth::token_store::TokenStore;
use crate::cache::content_cache::ContentCache;
use crate::cache::property_cache::DerivedPropertyCache;
use crate::config::ProjectConfig;
use crate::errors::{CloudError, Result};
use crate::persistency::PersistencyManager;
use crate::persistency::property_repository::PropertyRepository;
use crate::registry::item_registry::ItemRegistry;
use crate::registry::tree::TreeAssembler;
use crate::remote::gateway::RemoteGateway;
use crate::remote::remote_client::RemoteDirectoryClient;

/// Every long-lived component of one client session
#[derive(Clone)]
pub struct AppState {
    pub project_config: Arc<ProjectConfig>,
    pub persistency_manager: Arc<PersistencyManager>,
    pub auth: Arc<AuthManager>,
    pub gateway: RemoteGateway,
    pub registry: Arc<ItemRegistry>,
    pub tree: Arc<TreeAssembler>,
    pub property_cache: Arc<DerivedPropertyCache>,
    pub content_cache: Arc<ContentCache>,
}

pub async fn app_state_factory(
    project_config: ProjectConfig,
    remote: Arc<dyn RemoteDirectoryClient>,
    prompt: Arc<dyn RegistrationPrompt>,
) -> Result<AppState> {
    let settings = &project_config.settings;

    let persistency_manager = PersistencyManager::new(&project_config.property_db_path()).await?;
    persistency_manager.init_database().await?;
    let repository = PropertyRepository::new(
        persistency_manager.pool().clone(),
        settings.retained_property_versions,
    );

    let token_store = TokenStore::new(&project_config.config_dir, settings.use_keyring)
        .map_err(|e| CloudError::Config(format!("{:#}", e)))?;
    info!("🔐 Device token storage: {}", token_store.get_storage_info());
    let auth = Arc::new(AuthManager::new(
        token_store,
        prompt,
        settings.user_token_lifetime,
    )?);

    let gateway = RemoteGateway::new(remote, auth.clone());
    let registry = Arc::new(ItemRegistry::new(
        gateway.clone(),
        settings.refresh_threshold,
    ));
    let tree = Arc::new(TreeAssembler::new(registry.clone()));

    Ok(AppState {
        project_config: Arc::new(project_config),
        persistency_manager: Arc::new(persistency_manager),
        auth,
        gateway,
        registry,
        tree,
        property_cache: Arc::new(DerivedPropertyCache::new(Arc::new(repository))),
        content_cache: Arc::new(ContentCache::new()),
    })
}
