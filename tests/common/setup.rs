#![allow(dead_code)]
use anyhow::{Context, Result};
use log::LevelFilter;
use once_cell::sync::Lazy;
use rmcloud::auth::prompt::{NonInteractive, RegistrationPrompt};
use rmcloud::config::ProjectConfig;
use rmcloud::log_appender::setup_logging;
use rmcloud::remote::mock::{MOCK_REGISTRATION_CODE, MockRemoteClient};
use rmcloud::{BlockingClient, Client};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Log directory shared by every test of one binary; logging is installed once
static TEST_LOGS: Lazy<Option<TempDir>> = Lazy::new(|| {
    let dir = TempDir::new().ok()?;
    if let Err(e) = setup_logging(dir.path(), LevelFilter::Debug) {
        println!("⚠️ Test logging not installed: {:#}", e);
    }
    Some(dir)
});

/// Isolated directories plus the mock remote one test runs against
pub struct TestEnv {
    temp_dir: TempDir,
    pub mock: MockRemoteClient,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        Lazy::force(&TEST_LOGS);
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        println!("🧪 Test environment created at: {}", temp_dir.path().display());
        Ok(Self {
            temp_dir,
            mock: MockRemoteClient::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn project_config(&self) -> Result<ProjectConfig> {
        ProjectConfig::in_dir(self.temp_dir.path())
    }

    /// Async client without a registered device
    pub async fn client_with_prompt(&self, prompt: Arc<dyn RegistrationPrompt>) -> Result<Client> {
        let client = Client::connect(self.project_config()?, Arc::new(self.mock.clone()), prompt)
            .await
            .context("Failed to connect client")?;
        Ok(client)
    }

    /// Async client with the device already registered
    pub async fn client(&self) -> Result<Client> {
        let client = self.client_with_prompt(Arc::new(NonInteractive)).await?;
        client.register_device(MOCK_REGISTRATION_CODE).await?;
        Ok(client)
    }

    /// Blocking client with the device already registered
    pub fn blocking_client(&self) -> Result<BlockingClient> {
        let client = BlockingClient::connect(
            self.project_config()?,
            Arc::new(self.mock.clone()),
            Arc::new(NonInteractive),
        )?;
        client.register_device(MOCK_REGISTRATION_CODE)?;
        Ok(client)
    }
}
