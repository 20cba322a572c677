//! Configuration Types
//!
//! All configuration structures with sensible defaults. Every numeric
//! tunable named in `constants.rs` is overridable here; the constants are
//! defaults, not contract.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::provider::ProviderSpec;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Ordered provider list (priority field breaks ties with file order)
    pub providers: Vec<ProviderSpec>,

    /// Generation call defaults
    pub generation: GenerationConfig,

    /// Dispatcher fallback behavior
    pub dispatcher: DispatcherConfig,

    /// Step pipeline engine settings
    pub pipeline: PipelineConfig,

    /// Render scheduler settings
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            providers: Vec::new(),
            generation: GenerationConfig::default(),
            dispatcher: DispatcherConfig::default(),
            pipeline: PipelineConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(crate::types::ForgeError::Config(format!(
                "generation temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }

        if self.generation.max_tokens == 0 {
            return Err(crate::types::ForgeError::Config(
                "generation max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.render.debounce_ms == 0 {
            return Err(crate::types::ForgeError::Config(
                "render debounce_ms must be greater than 0".to_string(),
            ));
        }

        if self.render.max_concurrent == 0 {
            return Err(crate::types::ForgeError::Config(
                "render max_concurrent must be greater than 0".to_string(),
            ));
        }

        for spec in &self.providers {
            spec.validate()?;
        }

        Ok(())
    }
}

// =============================================================================
// Generation Defaults
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Temperature for generation calls (0.0 = deterministic)
    pub temperature: f32,
    /// Maximum output tokens per call
    pub max_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: constants::dispatcher::DEFAULT_TEMPERATURE,
            max_tokens: constants::dispatcher::DEFAULT_MAX_TOKENS,
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Fixed backoff before the next provider after a 429 (seconds)
    pub rate_limit_backoff_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_secs: constants::dispatcher::RATE_LIMIT_BACKOFF_SECS,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries per step before the pipeline fails (cap+1 total attempts)
    pub max_step_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_step_retries: constants::pipeline::MAX_STEP_RETRIES,
        }
    }
}

// =============================================================================
// Render
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Debounce window for coalescing repeated render requests (ms)
    pub debounce_ms: u64,
    /// Global bound on simultaneous in-flight renders
    pub max_concurrent: usize,
    /// Timeout for one sandboxed render execution (seconds)
    pub render_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: constants::render::DEBOUNCE_WINDOW_MS,
            max_concurrent: constants::render::MAX_CONCURRENT_RENDERS,
            render_timeout_secs: constants::render::RENDER_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.debounce_ms, 300);
        assert_eq!(config.render.max_concurrent, 3);
        assert_eq!(config.pipeline.max_step_retries, 2);
    }

    #[test]
    fn test_validate_rejects_zero_bound() {
        let mut config = Config::default();
        config.render.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());
    }
}
