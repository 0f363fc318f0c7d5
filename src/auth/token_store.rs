use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const KEYRING_SERVICE: &str = "rmcloud";
const KEYRING_USER: &str = "device_token";
const DEVICE_TOKEN_FILE_NAME: &str = "device_token.json";

/// The durable half of the credential pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub device_token: String,
    pub device_id: String,
    pub registered_at: DateTime<Utc>,
}

/// Where the device credential lives between processes
pub struct TokenStore {
    keyring_entry: Option<Entry>,
    file_path: PathBuf,
}

impl TokenStore {
    /// Create a store that writes to the keyring when `use_keyring` is set
    /// and a keyring backend is reachable, and to `config_dir` otherwise.
    pub fn new(config_dir: &Path, use_keyring: bool) -> Result<Self> {
        let keyring_entry = if use_keyring {
            Self::create_keyring_entry()
        } else {
            None
        };
        let file_path = config_dir.join(DEVICE_TOKEN_FILE_NAME);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            keyring_entry,
            file_path,
        })
    }

    fn create_keyring_entry() -> Option<Entry> {
        Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()
    }

    /// Check if keyring is available and working
    fn is_keyring_available(&self) -> bool {
        match self.keyring_entry {
            Some(ref entry) => matches!(
                entry.get_password(),
                Ok(_) | Err(keyring::Error::NoEntry)
            ),
            None => false,
        }
    }

    pub fn save(&self, credentials: &DeviceCredentials) -> Result<()> {
        let serialized = serde_json::to_string(credentials)?;

        if let (true, Some(entry)) = (self.is_keyring_available(), &self.keyring_entry) {
            entry
                .set_password(&serialized)
                .context("Failed to write device token to keyring")?;
        } else {
            fs::write(&self.file_path, serialized).with_context(|| {
                format!("Failed to write device token to {}", self.file_path.display())
            })?;
        }

        Ok(())
    }

    /// Load the stored credential; `Ok(None)` when nothing was ever stored
    pub fn load(&self) -> Result<Option<DeviceCredentials>> {
        if let (true, Some(entry)) = (self.is_keyring_available(), &self.keyring_entry) {
            return match entry.get_password() {
                Ok(stored) => Ok(Some(serde_json::from_str(&stored)?)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(anyhow!("Failed to read device token from keyring: {}", e)),
            };
        }

        if !self.file_path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.file_path)?;
        let credentials: DeviceCredentials = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt device token file {}", self.file_path.display()))?;
        Ok(Some(credentials))
    }

    /// Get storage method info for debugging
    pub fn get_storage_info(&self) -> String {
        if self.is_keyring_available() {
            "system keyring".to_string()
        } else {
            format!("file: {:?}", self.file_path)
        }
    }
}
