use log::{debug, info, warn};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::auth::prompt::RegistrationPrompt;
use crate::auth::token_store::{DeviceCredentials, TokenStore};
use crate::errors::{CloudError, Result};
use crate::remote::remote_client::RemoteDirectoryClient;

/// Page where a human obtains the one-time registration code
pub const DEVICE_LINK_URL: &str = "https://my.remarkable.com/device/desktop/connect";

/// Where the credential lifecycle currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoDeviceToken,
    HasDeviceToken,
    HasUserToken,
}

#[derive(Debug)]
struct UserToken {
    token: String,
    obtained_at: Instant,
}

/// Owns the device/user credential pair.
///
/// The device token is durable and obtained once through registration; the
/// user token lives in memory and is re-derived from the device token once
/// per session, after it ages past its lifetime, or after the remote rejects
/// it.
pub struct AuthManager {
    token_store: TokenStore,
    prompt: Arc<dyn RegistrationPrompt>,
    device: RwLock<Option<DeviceCredentials>>,
    bootstrap_lock: Mutex<()>,
    user_token: Mutex<Option<UserToken>>,
    user_token_lifetime: Duration,
}

impl AuthManager {
    /// Create the manager, picking up a previously stored device token
    pub fn new(
        token_store: TokenStore,
        prompt: Arc<dyn RegistrationPrompt>,
        user_token_lifetime: Duration,
    ) -> Result<Self> {
        let device = token_store
            .load()
            .map_err(|e| CloudError::Auth(format!("Failed to load device token: {:#}", e)))?;

        match device {
            Some(ref creds) => info!(
                "🔑 Loaded device token for device {} from {}",
                creds.device_id,
                token_store.get_storage_info()
            ),
            None => info!("🔑 No device token stored yet"),
        }

        Ok(Self {
            token_store,
            prompt,
            device: RwLock::new(device),
            bootstrap_lock: Mutex::new(()),
            user_token: Mutex::new(None),
            user_token_lifetime,
        })
    }

    pub async fn state(&self) -> AuthState {
        if self.cached_device_token().is_none() {
            return AuthState::NoDeviceToken;
        }
        match self.user_token.lock().await.as_ref() {
            Some(held) if !self.is_expired(held) => AuthState::HasUserToken,
            _ => AuthState::HasDeviceToken,
        }
    }

    fn cached_device_token(&self) -> Option<String> {
        self.device
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|creds| creds.device_token.clone())
    }

    fn is_expired(&self, held: &UserToken) -> bool {
        held.obtained_at.elapsed() >= self.user_token_lifetime
    }

    /// Return the device token, bootstrapping it through the prompt if needed
    pub async fn device_token(&self, remote: &dyn RemoteDirectoryClient) -> Result<String> {
        if let Some(token) = self.cached_device_token() {
            return Ok(token);
        }

        let _guard = self.bootstrap_lock.lock().await;
        if let Some(token) = self.cached_device_token() {
            return Ok(token);
        }

        if !self.prompt.can_prompt() {
            return Err(CloudError::Auth(
                "No device token stored and no interactive prompt available; register this device first"
                    .to_string(),
            ));
        }

        info!("🌐 Device not registered, asking for a code from {}", DEVICE_LINK_URL);
        let code = self
            .prompt
            .request_code(DEVICE_LINK_URL)
            .await
            .map_err(|e| CloudError::Auth(format!("Failed to read registration code: {:#}", e)))?;

        self.register_locked(remote, code.trim()).await
    }

    /// Register this device with a code the host collected itself
    pub async fn register_device(&self, remote: &dyn RemoteDirectoryClient, code: &str) -> Result<()> {
        {
            let _guard = self.bootstrap_lock.lock().await;
            self.register_locked(remote, code.trim()).await?;
        }
        // a session derived from a previous device must not outlive it
        self.user_token.lock().await.take();
        Ok(())
    }

    async fn register_locked(&self, remote: &dyn RemoteDirectoryClient, code: &str) -> Result<String> {
        let device_id = Uuid::new_v4().to_string();
        let device_token = remote.exchange_device_token(code, &device_id).await?;

        let credentials = DeviceCredentials {
            device_token: device_token.clone(),
            device_id,
            registered_at: chrono::Utc::now(),
        };
        self.token_store
            .save(&credentials)
            .map_err(|e| CloudError::Auth(format!("Failed to persist device token: {:#}", e)))?;

        info!(
            "✅ Device {} registered, token saved using: {}",
            credentials.device_id,
            self.token_store.get_storage_info()
        );
        *self
            .device
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credentials);
        Ok(device_token)
    }

    /// Return a usable user token, exchanging the device token when none is held
    /// or the held one has expired.
    ///
    /// Concurrent callers share one exchange. A failed exchange leaves no token
    /// behind, so the next call simply tries again.
    pub async fn user_token(&self, remote: &dyn RemoteDirectoryClient) -> Result<String> {
        let mut held = self.user_token.lock().await;
        if let Some(current) = held.as_ref() {
            if !self.is_expired(current) {
                return Ok(current.token.clone());
            }
            debug!("⌛ User token expired, renewing");
        }
        *held = None;

        let device_token = self.device_token(remote).await?;
        let token = remote
            .exchange_user_token(&device_token)
            .await
            .inspect_err(|e| warn!("🔄 User token exchange failed, will retry on next use: {}", e))?;

        info!("✅ User token renewed");
        *held = Some(UserToken {
            token: token.clone(),
            obtained_at: Instant::now(),
        });
        Ok(token)
    }

    /// Forget `rejected` so the next call exchanges a fresh token.
    ///
    /// A token renewed by a concurrent caller in the meantime is kept.
    pub async fn invalidate_user_token(&self, rejected: &str) {
        let mut held = self.user_token.lock().await;
        if held.as_ref().is_some_and(|current| current.token == rejected) {
            warn!("🔒 User token rejected by remote, dropping it");
            *held = None;
        }
    }
}
