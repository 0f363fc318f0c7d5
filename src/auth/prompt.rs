//! Capability seam for the interactive half of device registration.

use anyhow::{Result, anyhow};
use async_trait::async_trait;

/// Something that can ask a human for the one-time registration code.
///
/// Hosts decide whether their execution context can reach a human; the auth
/// manager only asks `can_prompt` and never sniffs the environment itself.
#[async_trait]
pub trait RegistrationPrompt: Send + Sync {
    /// Whether this context can reach a human right now
    fn can_prompt(&self) -> bool;

    /// Ask for the code shown on `link_url`
    async fn request_code(&self, link_url: &str) -> Result<String>;
}

/// Prompt for daemons, services and tests: never reaches a human
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

#[async_trait]
impl RegistrationPrompt for NonInteractive {
    fn can_prompt(&self) -> bool {
        false
    }

    async fn request_code(&self, _link_url: &str) -> Result<String> {
        Err(anyhow!("No interactive prompt available"))
    }
}
