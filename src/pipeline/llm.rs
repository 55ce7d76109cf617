//! Chat-completion calls with retry, backoff and a per-call timeout.
//!
//! [`ChatBackend`] is the seam between the pipeline and whatever answers
//! the conversation. [`EdgequakeBackend`] adapts any edgequake-llm
//! provider; tests substitute scripted backends.
//!
//! ## Retry Strategy
//!
//! Transient provider errors (429 / 503, dropped connections, slow
//! responses) are retried with exponential backoff: after failed attempt
//! `n` (0-based) the client waits `retry_delay * 2^n`. With the default
//! 2 s base and 3 attempts the waits are 2 s → 4 s, and there is no wait
//! after the last attempt. A call that exceeds the timeout counts as a
//! failed attempt.

use crate::config::TriageConfig;
use crate::output::TokenUsage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Who is speaking in a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

/// One message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A completed reply and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// A single failed completion attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Provider(String),
}

/// Something that can answer a conversation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<ChatReply, BackendError>;
}

/// [`ChatBackend`] over an edgequake-llm provider.
pub struct EdgequakeBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl EdgequakeBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TriageConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl ChatBackend for EdgequakeBackend {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<ChatReply, BackendError> {
        let messages: Vec<ChatMessage> = messages
            .iter()
            .map(|turn| match turn.role {
                ChatRole::System => ChatMessage::system(turn.content.clone()),
                ChatRole::User => ChatMessage::user(turn.content.clone()),
            })
            .collect();

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| BackendError::Provider(e.to_string()))?;

        Ok(ChatReply {
            content: response.content,
            usage: TokenUsage::new(
                response.prompt_tokens as u64,
                response.completion_tokens as u64,
            ),
        })
    }
}

/// Build `CompletionOptions` from the triage config.
fn build_options(config: &TriageConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// How many times to try, how long to wait, how long a call may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Wait before retrying after 0-based `attempt` failed, or `None` when
    /// that was the last attempt.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(2u32.saturating_pow(attempt)))
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("service unavailable after {attempts} attempts: {last_error}")]
pub struct ServiceUnavailable {
    pub attempts: u32,
    pub last_error: BackendError,
}

/// A [`ChatBackend`] wrapped in the retry policy.
pub struct ResilientChatClient {
    backend: Arc<dyn ChatBackend>,
    policy: RetryPolicy,
}

impl ResilientChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `messages`, retrying transient failures.
    ///
    /// Returns the first successful reply. Errors only once the attempt
    /// budget is spent.
    pub async fn chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, ServiceUnavailable> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            let outcome = match timeout(self.policy.call_timeout, self.backend.complete(messages)).await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.policy.call_timeout)),
            };

            match outcome {
                Ok(reply) => {
                    debug!(
                        "Chat completed: {} input tokens, {} output tokens, {:?}",
                        reply.usage.prompt_tokens,
                        reply.usage.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(reply);
                }
                Err(e) => match self.policy.delay_after(attempt) {
                    Some(delay) => {
                        warn!(
                            "Chat attempt {}/{} failed: {}; retrying in {:?}",
                            attempt + 1,
                            self.policy.max_attempts,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(
                            "Chat failed after {} attempts: {}",
                            attempt + 1,
                            e
                        );
                        return Err(ServiceUnavailable {
                            attempts: attempt + 1,
                            last_error: e,
                        });
                    }
                },
            }
        }
    }
}
