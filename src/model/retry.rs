//! Retry wrapper with exponential backoff for model calls
//!
//! The engine itself never retries; hosts opt in by wrapping a client.

use crate::core::config::RetrySettings;
use crate::core::ToolError;
use crate::model::{ModelClient, ModelReply, ModelRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            capped_delay + rand::random::<f64>() * 0.25 * capped_delay
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Model client that retries retryable failures of the wrapped client
pub struct RetryingModel {
    inner: Arc<dyn ModelClient>,
    policy: RetryPolicy,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ModelClient for RetryingModel {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ToolError> {
        let mut attempt = 0;
        loop {
            match self.inner.invoke(request.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        "Model call failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt + 1,
                        self.policy.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
