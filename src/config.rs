use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static SETTINGS_FILE_NAME: &str = "settings.json";

/// Listing validity before the registry is considered stale
const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Age after which a held user token is exchanged again
const DEFAULT_USER_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolved directories plus the settings loaded from them
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub settings: Settings,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl ProjectConfig {
    /// Resolve the per-user project directories and load settings from them
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "rmcloud", "rmcloud")
            .ok_or_else(|| anyhow!("Failed to determine project directories"))?;
        Self::from_dirs(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.cache_dir().to_path_buf(),
            proj_dirs.data_dir().to_path_buf(),
        )
    }

    /// Root config, cache and data directories under a single directory
    pub fn in_dir(root: &Path) -> Result<Self> {
        Self::from_dirs(root.join("config"), root.join("cache"), root.join("data"))
    }

    fn from_dirs(config_dir: PathBuf, cache_dir: PathBuf, data_dir: PathBuf) -> Result<Self> {
        for dir in [&config_dir, &cache_dir, &data_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            }
        }

        let settings = Settings::new(&config_dir.join(SETTINGS_FILE_NAME))?;
        Ok(Self {
            settings,
            config_dir,
            cache_dir,
            data_dir,
        })
    }

    /// Path of the durable derived-property database
    pub fn property_db_path(&self) -> PathBuf {
        self.cache_dir.join(&self.settings.property_db_file)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// How long a listing stays valid before the next access refreshes it
    pub refresh_threshold: Duration,
    /// How long a user token is trusted before a fresh exchange
    pub user_token_lifetime: Duration,
    /// Store the device token in the system keyring instead of a file
    pub use_keyring: bool,
    /// File name of the derived-property database inside the cache directory
    pub property_db_file: String,
    /// Newest versions kept per item in the property database; `None` keeps all
    pub retained_property_versions: Option<usize>,
    /// Worker threads of the runtime owned by the blocking client
    pub blocking_worker_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            user_token_lifetime: DEFAULT_USER_TOKEN_LIFETIME,
            use_keyring: false,
            property_db_file: "filedata.db".to_string(),
            retained_property_versions: None,
            blocking_worker_threads: 2,
        }
    }
}

impl Settings {
    /// Load settings, falling back to (and persisting) defaults when the file is missing or broken
    pub fn new(config_file_path: &Path) -> Result<Self> {
        match Self::load_settings_from_file(config_file_path) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Error loading settings from file - creating default config: {}", e);
                let default = Self::default();
                default.save_to_file(config_file_path)?;
                Ok(default)
            }
        }
    }

    pub fn load_settings_from_file(config_file_path: &Path) -> Result<Self> {
        if !config_file_path.exists() {
            return Err(anyhow!("Config file not found"));
        }
        let data = fs::read_to_string(config_file_path)?;
        let settings: Self = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, config_file_path: &Path) -> Result<()> {
        if let Some(parent_path) = config_file_path.parent() {
            fs::create_dir_all(parent_path).context("Failed to create config directory")?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, data)?;
        Ok(())
    }
}
