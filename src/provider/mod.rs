//! Generation Provider Abstraction
//!
//! Defines the GenerationProvider trait for raw text generation against
//! interchangeable external endpoints, plus the fallback dispatcher that
//! routes one generation call across an ordered provider list.
//!
//! ## Modules
//!
//! - `dispatcher`: Priority-ordered fallback with failure classification
//! - `http`: reqwest-backed provider (single-shot or chunked streaming)
//! - `stream`: Incremental line-oriented event-stream decoder
//! - `normalize`: Output cleanup applied to accumulated text

mod dispatcher;
mod http;
mod normalize;
mod stream;

pub use dispatcher::{DispatchStats, DispatcherConfig, FallbackDispatcher, GenerationAttempt};
pub use http::HttpProvider;
pub use normalize::normalize_output;
pub use stream::{EventStreamDecoder, StreamEvent};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::types::{ForgeError, Result};

// =============================================================================
// Generation Call & Result
// =============================================================================

/// Message role for the provider wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One generation call: model, ordered messages, sampling knobs, streaming
/// flag. The dispatcher forwards it unchanged to each provider in turn.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub stream: bool,
}

/// Canonical result shape every provider family is normalized into before
/// any downstream code sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Accumulated, normalized output text
    pub text: String,
    /// Provider that produced the result
    pub provider: String,
    /// Model that produced the result
    pub model: String,
    /// Whether the result was assembled from a chunked stream
    pub streamed: bool,
    /// Wall-clock time for the winning attempt
    pub elapsed_ms: u64,
}

// =============================================================================
// Provider Specification (read-only configuration)
// =============================================================================

/// Read-only description of one external provider
///
/// Note: API keys are never serialized back out and are redacted in debug
/// output; the HTTP provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSpec {
    /// Provider name (unique within the list)
    pub name: String,
    /// Priority order (lower = try first)
    pub priority: u8,
    /// Whether the endpoint supports chunked event streaming
    pub supports_streaming: bool,
    /// Endpoint URL template
    pub endpoint: String,
    /// Model identifier sent with each call
    pub model: String,
    /// API key; never serialized to output
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: 100,
            supports_streaming: true,
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            timeout_secs: crate::constants::network::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("supports_streaming", &self.supports_streaming)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ForgeError::Config("provider name must not be empty".into()));
        }
        url::Url::parse(&self.endpoint).map_err(|e| {
            ForgeError::Config(format!(
                "provider '{}' endpoint is not a valid URL: {}",
                self.name, e
            ))
        })?;
        if self.timeout_secs == 0 {
            return Err(ForgeError::Config(format!(
                "provider '{}' timeout_secs must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Cancellation
// =============================================================================

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Externally-held token that aborts an in-flight streaming read.
///
/// Cloning shares the token; `cancel` wakes every waiter.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// =============================================================================
// Generation Provider Trait
// =============================================================================

/// Shared provider type for concurrent access across dispatch attempts
pub type SharedProvider = Arc<dyn GenerationProvider + Send + Sync>;

/// One external generative endpoint
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Execute one generation call, returning the raw accumulated text.
    ///
    /// Streaming providers must stop the chunk-reading loop promptly when
    /// `cancel` fires. Errors are classified `ProviderError`s wrapped in
    /// `ForgeError::Provider`.
    async fn generate(&self, call: &GenerationCall, cancel: &CancelToken) -> Result<String>;

    /// Provider name for logging and attempt records
    fn name(&self) -> &str;

    /// Whether this provider can assemble chunked streams
    fn supports_streaming(&self) -> bool;

    /// Check if the provider endpoint is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from a specification
pub fn create_provider(spec: &ProviderSpec) -> Result<SharedProvider> {
    Ok(Arc::new(HttpProvider::new(spec.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_validate_rejects_bad_endpoint() {
        let spec = ProviderSpec {
            name: "broken".into(),
            endpoint: "not a url".into(),
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_spec_debug_redacts_key() {
        let spec = ProviderSpec {
            name: "primary".into(),
            endpoint: "https://api.example.com/v1".into(),
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", spec);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        token.cancel();
        assert!(handle.await.expect("join"));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_token_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        // Must resolve immediately even with no notify in flight
        token.cancelled().await;
    }
}
