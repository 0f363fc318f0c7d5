mod common;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use common::fixtures::seed_scenario_a;
use common::setup::TestEnv;
use rmcloud::auth::auth_manager::{AuthState, DEVICE_LINK_URL};
use rmcloud::auth::prompt::{NonInteractive, RegistrationPrompt};
use rmcloud::remote::mock::MOCK_REGISTRATION_CODE;
use rmcloud::{CloudError, ROOT_ID};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers with a fixed code, as a human at a terminal would
struct TerminalPrompt {
    code: &'static str,
    asked: AtomicUsize,
}

#[async_trait]
impl RegistrationPrompt for TerminalPrompt {
    fn can_prompt(&self) -> bool {
        true
    }

    async fn request_code(&self, link_url: &str) -> Result<String> {
        if link_url != DEVICE_LINK_URL {
            return Err(anyhow!("unexpected link {}", link_url));
        }
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.code.to_string())
    }
}

#[tokio::test]
async fn test_non_interactive_without_device_token_fails_fast() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);
    let client = env.client_with_prompt(Arc::new(NonInteractive)).await?;

    assert_eq!(client.auth_state().await, AuthState::NoDeviceToken);
    assert!(matches!(client.children(ROOT_ID).await, Err(CloudError::Auth(_))));
    assert_eq!(env.mock.call_count("exchange_device_token"), 0);

    // virtual folders never need credentials
    assert!(client.get_by_id(ROOT_ID).await?.is_folder());
    Ok(())
}

#[tokio::test]
async fn test_interactive_bootstrap_registers_once() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);
    let prompt = Arc::new(TerminalPrompt {
        code: MOCK_REGISTRATION_CODE,
        asked: AtomicUsize::new(0),
    });
    let client = env.client_with_prompt(prompt.clone()).await?;

    assert_eq!(client.children(ROOT_ID).await?.len(), 1);
    assert_eq!(client.auth_state().await, AuthState::HasUserToken);
    client.invalidate_cache();
    client.children("A").await?;

    assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    assert_eq!(env.mock.call_count("exchange_device_token"), 1);
    assert_eq!(env.mock.call_count("exchange_user_token"), 1);
    Ok(())
}

#[tokio::test]
async fn test_device_token_persists_across_sessions() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);

    let first = env.client().await?;
    first.children(ROOT_ID).await?;
    first.close().await;
    drop(first);

    let second = env.client_with_prompt(Arc::new(NonInteractive)).await?;
    assert_eq!(second.auth_state().await, AuthState::HasDeviceToken);
    assert_eq!(second.children("A").await?.len(), 1);
    assert_eq!(env.mock.call_count("exchange_device_token"), 1);
    assert_eq!(env.mock.call_count("exchange_user_token"), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_exchange_is_retried_on_next_use() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);
    let client = env.client().await?;

    env.mock.fail_operation("exchange_user_token");
    assert!(matches!(client.refresh().await, Err(CloudError::Transport(_))));
    assert_eq!(client.auth_state().await, AuthState::HasDeviceToken);

    env.mock.clear_failures();
    assert_eq!(client.children(ROOT_ID).await?.len(), 1);
    assert_eq!(env.mock.call_count("exchange_user_token"), 2);
    Ok(())
}

#[tokio::test]
async fn test_rejected_user_token_is_renewed() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);
    let client = env.client().await?;

    client.children(ROOT_ID).await?;
    env.mock.revoke_user_tokens();
    client.invalidate_cache();

    assert!(matches!(client.refresh().await, Err(CloudError::Auth(_))));
    client.refresh().await?;
    assert_eq!(env.mock.call_count("exchange_user_token"), 2);
    Ok(())
}

#[tokio::test]
async fn test_wrong_registration_code_is_an_auth_error() -> Result<()> {
    let env = TestEnv::new()?;
    let client = env.client_with_prompt(Arc::new(NonInteractive)).await?;

    assert!(matches!(
        client.register_device("wrong").await,
        Err(CloudError::Auth(_))
    ));
    assert_eq!(client.auth_state().await, AuthState::NoDeviceToken);
    Ok(())
}
