//! Provider Fallback Dispatcher
//!
//! Executes one generation call against an ordered provider list.
//!
//! ## Strategy
//!
//! 1. Try providers in priority order
//! 2. On failure, classify and route:
//!    - authentication: surface immediately, no silent fallback
//!    - rate-limited: fixed backoff (with jitter), then the NEXT provider
//!    - server / network / malformed: next provider with no delay
//! 3. First success wins; accumulated text is normalized for the target kind
//! 4. Exhaustion returns a fatal error listing every classified failure

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::normalize::normalize_output;
use super::{CancelToken, GenerationCall, GenerationResult, ProviderSpec, SharedProvider};
use crate::types::{
    ForgeError, ProviderError, ProviderErrorKind, ProviderFailure, Result, TargetKind,
};

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed backoff before the next provider after a rate limit
    pub rate_limit_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff: Duration::from_secs(
                crate::constants::dispatcher::RATE_LIMIT_BACKOFF_SECS,
            ),
        }
    }
}

impl DispatcherConfig {
    pub fn from_config(config: &crate::config::DispatcherConfig) -> Self {
        Self {
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
        }
    }
}

/// Record of one provider attempt, kept for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub success: bool,
    /// Classified failure, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProviderFailure>,
    pub elapsed_ms: u64,
    /// Accumulated text length at termination
    pub chars_received: usize,
}

/// Execution statistics for one dispatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub attempts: Vec<GenerationAttempt>,
    pub successful_provider: Option<String>,
    pub total_duration_ms: u64,
}

/// Fallback dispatcher over an ordered provider list
pub struct FallbackDispatcher {
    providers: Vec<SharedProvider>,
    config: DispatcherConfig,
}

impl FallbackDispatcher {
    pub fn new(providers: Vec<SharedProvider>, config: DispatcherConfig) -> Self {
        Self { providers, config }
    }

    /// Build from provider specs, ordered by their priority field
    pub fn from_specs(specs: &[ProviderSpec], config: DispatcherConfig) -> Result<Self> {
        let mut ordered: Vec<&ProviderSpec> = specs.iter().collect();
        ordered.sort_by_key(|s| s.priority);

        let providers = ordered
            .into_iter()
            .map(super::create_provider)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(providers, config))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Health-check every provider in order
    pub async fn health_report(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let healthy = provider.health_check().await.unwrap_or(false);
            report.push((provider.name().to_string(), healthy));
        }
        report
    }

    /// Execute one generation call with fallback.
    ///
    /// Returns the first successful result (normalized for `kind`) together
    /// with the attempt records. Authentication failures abort the whole
    /// dispatch; every other failure class moves on to the next provider.
    #[instrument(skip(self, call, cancel), fields(providers = self.providers.len(), kind = %kind))]
    pub async fn dispatch(
        &self,
        call: &GenerationCall,
        kind: TargetKind,
        cancel: &CancelToken,
    ) -> Result<(GenerationResult, DispatchStats)> {
        let start_time = std::time::Instant::now();
        let mut stats = DispatchStats::default();
        let mut failures: Vec<ProviderFailure> = Vec::new();

        if self.providers.is_empty() {
            return Err(ForgeError::Config(
                "No providers configured for dispatch".to_string(),
            ));
        }

        let last_index = self.providers.len() - 1;
        for (index, provider) in self.providers.iter().enumerate() {
            let provider_name = provider.name().to_string();
            let attempt_start = std::time::Instant::now();
            let started_at = Utc::now();

            debug!(provider = %provider_name, attempt = index + 1, "Dispatch attempt");

            let outcome = provider.generate(call, cancel).await;
            let elapsed_ms = attempt_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(text) if text.trim().is_empty() => {
                    // Success status with nothing usable in the body
                    let error = ProviderError::with_provider(
                        ProviderErrorKind::Malformed,
                        "empty body",
                        &provider_name,
                    );
                    self.record_failure(&mut stats, &mut failures, &error, started_at, elapsed_ms, 0);
                    warn!(provider = %provider_name, "Empty body, trying next provider");
                }
                Ok(text) => {
                    stats.attempts.push(GenerationAttempt {
                        provider: provider_name.clone(),
                        started_at,
                        success: true,
                        failure: None,
                        elapsed_ms,
                        chars_received: text.len(),
                    });
                    stats.successful_provider = Some(provider_name.clone());
                    stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

                    info!(
                        provider = %provider_name,
                        attempts = stats.attempts.len(),
                        chars = text.len(),
                        "Dispatch succeeded"
                    );

                    let result = GenerationResult {
                        text: normalize_output(&text, kind),
                        provider: provider_name,
                        model: call.model.clone(),
                        streamed: call.stream && provider.supports_streaming(),
                        elapsed_ms,
                    };
                    return Ok((result, stats));
                }
                Err(ForgeError::Cancelled(reason)) => {
                    stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
                    return Err(ForgeError::Cancelled(reason));
                }
                Err(err) => {
                    let error = match err {
                        ForgeError::Provider(e) => e,
                        other => ProviderError::with_provider(
                            ProviderErrorKind::Server,
                            other.to_string(),
                            &provider_name,
                        ),
                    };
                    self.record_failure(&mut stats, &mut failures, &error, started_at, elapsed_ms, 0);

                    warn!(
                        provider = %provider_name,
                        kind = %error.kind,
                        error = %error.message,
                        "Provider failed"
                    );

                    if error.is_fatal() {
                        // Credentials are likely shared across the list;
                        // falling back silently would mask the misconfiguration.
                        info!(provider = %provider_name, "Authentication failure, surfacing immediately");
                        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
                        return Err(error.into());
                    }

                    if error.kind.backoff_before_next() && index < last_index {
                        let wait = error
                            .retry_after
                            .unwrap_or(self.config.rate_limit_backoff);
                        let wait = wait + random_jitter(wait);
                        info!(wait_ms = wait.as_millis() as u64, "Rate limited, backing off before next provider");
                        sleep(wait).await;
                    }
                }
            }
        }

        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
        Err(ForgeError::DispatchExhausted(failures))
    }

    fn record_failure(
        &self,
        stats: &mut DispatchStats,
        failures: &mut Vec<ProviderFailure>,
        error: &ProviderError,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        chars_received: usize,
    ) {
        let failure = ProviderFailure {
            provider: error.provider.clone().unwrap_or_default(),
            kind: error.kind,
            message: error.message.clone(),
        };
        stats.attempts.push(GenerationAttempt {
            provider: failure.provider.clone(),
            started_at,
            success: false,
            failure: Some(failure.clone()),
            elapsed_ms,
            chars_received,
        });
        failures.push(failure);
    }
}

/// Jitter of up to a quarter of the base delay, thread-local RNG
fn random_jitter(base: Duration) -> Duration {
    let max_jitter_ms = (base.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..max_jitter_ms);
    Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationProvider;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubProvider {
        name: String,
        response: std::result::Result<String, ProviderErrorKind>,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn ok(name: &str, text: &str) -> Self {
            Self {
                name: name.to_string(),
                response: Ok(text.to_string()),
                calls: AtomicU32::new(0),
            }
        }

        fn failing(name: &str, kind: ProviderErrorKind) -> Self {
            Self {
                name: name.to_string(),
                response: Err(kind),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for StubProvider {
        async fn generate(&self, _call: &GenerationCall, _cancel: &CancelToken) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(kind) => Err(ProviderError::with_provider(
                    *kind,
                    format!("{} stub failure", self.name),
                    &self.name,
                )
                .into()),
            }
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(self.response.is_ok())
        }
    }

    fn call() -> GenerationCall {
        GenerationCall {
            model: "test-model".into(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: 256,
            stream: false,
        }
    }

    fn dispatcher(providers: Vec<Arc<StubProvider>>) -> FallbackDispatcher {
        let shared = providers
            .into_iter()
            .map(|p| p as SharedProvider)
            .collect();
        FallbackDispatcher::new(
            shared,
            DispatcherConfig {
                rate_limit_backoff: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn test_first_provider_success() {
        let d = dispatcher(vec![
            Arc::new(StubProvider::ok("primary", "<svg></svg>")),
            Arc::new(StubProvider::ok("backup", "unused")),
        ]);

        let (result, stats) = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect("dispatch");
        assert_eq!(result.provider, "primary");
        assert_eq!(stats.attempts.len(), 1);
        assert!(stats.attempts[0].success);
    }

    #[tokio::test]
    async fn test_server_error_falls_back_and_records_attempt() {
        let a = Arc::new(StubProvider::failing("a", ProviderErrorKind::Server));
        let b = Arc::new(StubProvider::ok("b", "<svg></svg>"));
        let d = dispatcher(vec![a.clone(), b.clone()]);

        let (result, stats) = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect("dispatch");

        assert_eq!(result.provider, "b");
        assert_eq!(stats.successful_provider.as_deref(), Some("b"));
        assert_eq!(stats.attempts.len(), 2);
        assert!(!stats.attempts[0].success);
        assert_eq!(
            stats.attempts[0].failure.as_ref().map(|f| f.kind),
            Some(ProviderErrorKind::Server)
        );
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_surfaces_immediately() {
        let a = Arc::new(StubProvider::failing("a", ProviderErrorKind::Authentication));
        let b = Arc::new(StubProvider::ok("b", "unused"));
        let d = dispatcher(vec![a, b.clone()]);

        let err = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect_err("should fail");
        match err {
            ForgeError::Provider(e) => assert_eq!(e.kind, ProviderErrorKind::Authentication),
            other => panic!("unexpected error: {}", other),
        }
        // The fallback provider must never have been consulted
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_moves_to_next_provider_after_backoff() {
        let a = Arc::new(StubProvider::failing("a", ProviderErrorKind::RateLimited));
        let b = Arc::new(StubProvider::ok("b", "<svg></svg>"));
        let d = dispatcher(vec![a.clone(), b]);

        let (result, _) = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect("dispatch");
        assert_eq!(result.provider, "b");
        // Rate-limited provider is not retried itself
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_every_failure() {
        let d = dispatcher(vec![
            Arc::new(StubProvider::failing("a", ProviderErrorKind::Server)),
            Arc::new(StubProvider::failing("b", ProviderErrorKind::Network)),
        ]);

        let err = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect_err("should exhaust");
        match err {
            ForgeError::DispatchExhausted(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].provider, "a");
                assert_eq!(failures[1].kind, ProviderErrorKind::Network);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_body_treated_as_malformed() {
        let d = dispatcher(vec![
            Arc::new(StubProvider::ok("a", "   ")),
            Arc::new(StubProvider::ok("b", "<svg></svg>")),
        ]);

        let (result, stats) = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect("dispatch");
        assert_eq!(result.provider, "b");
        assert_eq!(
            stats.attempts[0].failure.as_ref().map(|f| f.kind),
            Some(ProviderErrorKind::Malformed)
        );
    }

    #[tokio::test]
    async fn test_empty_provider_list_is_config_error() {
        let d = FallbackDispatcher::new(vec![], DispatcherConfig::default());
        let err = d
            .dispatch(&call(), TargetKind::IconPack, &CancelToken::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn test_random_jitter_bounded() {
        let base = Duration::from_millis(1000);
        assert!(random_jitter(base) <= Duration::from_millis(250));
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }
}
