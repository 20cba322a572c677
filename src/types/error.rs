//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for fallback and retry decisions at the
//! dispatcher layer and structured, suggestion-carrying errors at the
//! render and validation layers.
//!
//! ## Error Taxonomy
//!
//! - **Provider** (dispatcher layer): `Authentication`, `RateLimited`,
//!   `Server`, `Network`, `Malformed`
//! - **Render** (render layer): `Syntax`, `Import`, `Props`, `Styling`,
//!   `Runtime`
//! - **Validation** (pipeline/extractor layer): structural checks with
//!   actionable suggestions
//!
//! ## Design Principles
//!
//! - Single unified error type (ForgeError) for the entire application
//! - Category-based routing for fallback decisions
//! - Render and validation errors always carry suggestions
//! - No panic/unwrap - all errors are recoverable

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Provider Error Classification
// =============================================================================

/// Failure classes for a single provider attempt, driving fallback routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorKind {
    /// Bad or missing credentials - fatal, surface immediately
    Authentication,
    /// 429 - wait a fixed backoff, then try the next provider
    RateLimited,
    /// 5xx - try the next provider with no delay
    Server,
    /// Connection reset/timeout - try the next provider with no delay
    Network,
    /// Success status but unparseable/empty body - treated as server class
    Malformed,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::Server => write!(f, "SERVER"),
            Self::Network => write!(f, "NETWORK"),
            Self::Malformed => write!(f, "MALFORMED_RESPONSE"),
        }
    }
}

impl ProviderErrorKind {
    /// Fatal classes abort the whole dispatch instead of falling back.
    ///
    /// Authentication failures are assumed to be shared across the provider
    /// list (same credential scope), so silent fallback would only mask a
    /// misconfiguration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Whether the dispatcher should pause before moving to the next provider
    pub fn backoff_before_next(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Classified failure from one provider attempt
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderError {
    /// Failure class for routing decisions
    pub kind: ProviderErrorKind,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait before the next attempt (if the response carried one)
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        kind: ProviderErrorKind,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add provider context to an existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Add a suggested wait duration
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps HTTP statuses, transport failures, and sandbox error text onto the
/// error taxonomy
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-success HTTP status (more accurate than string matching)
    pub fn classify_http_status(
        status: u16,
        message: impl Into<String>,
        provider: &str,
    ) -> ProviderError {
        let message = message.into();
        match status {
            401 | 403 => {
                ProviderError::with_provider(ProviderErrorKind::Authentication, message, provider)
            }
            429 => ProviderError::with_provider(ProviderErrorKind::RateLimited, message, provider),
            500..=599 => ProviderError::with_provider(ProviderErrorKind::Server, message, provider),
            408 => ProviderError::with_provider(ProviderErrorKind::Network, message, provider),
            // Remaining 4xx: the request itself was rejected; route like a
            // server failure so the next provider still gets a chance.
            _ => ProviderError::with_provider(ProviderErrorKind::Server, message, provider),
        }
    }

    /// Classify a transport-level failure (no HTTP status available)
    pub fn classify_transport(message: impl Into<String>, provider: &str) -> ProviderError {
        ProviderError::with_provider(ProviderErrorKind::Network, message, provider)
    }

    /// Classify an error message when no status is available
    pub fn classify(message: &str, provider: &str) -> ProviderError {
        let lower = message.to_lowercase();

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("invalid key")
            || lower.contains("credential")
        {
            return ProviderError::with_provider(
                ProviderErrorKind::Authentication,
                message,
                provider,
            );
        }

        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return ProviderError::with_provider(ProviderErrorKind::RateLimited, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("reset")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return ProviderError::with_provider(ProviderErrorKind::Network, message, provider);
        }

        if lower.contains("empty body")
            || lower.contains("unparseable")
            || lower.contains("no content")
        {
            return ProviderError::with_provider(ProviderErrorKind::Malformed, message, provider);
        }

        ProviderError::with_provider(ProviderErrorKind::Server, message, provider)
    }

    /// Classify an error thrown by the sandboxed render surface
    pub fn classify_render(message: &str) -> RenderErrorKind {
        let lower = message.to_lowercase();

        if lower.contains("unexpected token")
            || lower.contains("syntax")
            || lower.contains("unexpected end of input")
            || lower.contains("unterminated")
        {
            return RenderErrorKind::Syntax;
        }

        if lower.contains("cannot find module")
            || lower.contains("failed to resolve")
            || lower.contains("module not found")
            || lower.contains("import")
        {
            return RenderErrorKind::Import;
        }

        if lower.contains("props")
            || lower.contains("property") && (lower.contains("undefined") || lower.contains("null"))
            || lower.contains("proptypes")
        {
            return RenderErrorKind::Props;
        }

        if lower.contains("css") || lower.contains("style") || lower.contains("stylesheet") {
            return RenderErrorKind::Styling;
        }

        RenderErrorKind::Runtime
    }
}

// =============================================================================
// Render Error
// =============================================================================

/// Failure classes for a render execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderErrorKind {
    Syntax,
    Import,
    Props,
    Styling,
    Runtime,
}

impl std::fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Import => write!(f, "import"),
            Self::Props => write!(f, "props"),
            Self::Styling => write!(f, "styling"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

impl RenderErrorKind {
    /// Canned remediation suggestions for this failure class
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::Syntax => &[
                "Check for unmatched brackets, parentheses, or braces",
                "Verify string literals and template expressions are terminated",
                "Regenerate the artifact if the source was truncated",
            ],
            Self::Import => &[
                "Remove imports of modules unavailable in the sandbox",
                "Inline small dependencies instead of importing them",
                "Declare external dependencies in the component's dependency list",
            ],
            Self::Props => &[
                "Provide default values for all destructured props",
                "Guard property access on optional props",
                "Check the props schema matches the component's usage",
            ],
            Self::Styling => &[
                "Validate embedded CSS syntax",
                "Scope selectors to the component root",
                "Remove references to undefined CSS variables",
            ],
            Self::Runtime => &[
                "Check the error message for the failing expression",
                "Retry the render; transient sandbox limits may have been hit",
                "Simplify the artifact and re-render incrementally",
            ],
        }
    }
}

/// Structured render failure: `{type, message, suggestions}` plus an
/// optional source position for syntax-class failures
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RenderError {
    #[serde(rename = "type")]
    pub kind: RenderErrorKind,
    pub message: String,
    /// Byte offset of the offending character, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub suggestions: Vec<String>,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "[{}] {} (at {})", self.kind, self.message, pos),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RenderError {}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            suggestions: kind.suggestions().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Classify a thrown sandbox error into a structured render error
    pub fn from_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ErrorClassifier::classify_render(&message);
        Self::new(kind, message)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structural validation failure with actionable suggestions
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: {}", self.message)
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

// =============================================================================
// Per-Provider Failure Record (for exhaustion reports)
// =============================================================================

/// One provider's classified failure, carried by the exhaustion error so the
/// caller can distinguish "rotate credentials" from "retry later"
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.kind, self.message)
    }
}

fn summarize_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Dispatcher Errors
    // -------------------------------------------------------------------------
    /// Classified failure from a single provider attempt
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Every provider in the list failed; carries each classified reason
    #[error("all providers exhausted: {}", summarize_failures(.0))]
    DispatchExhausted(Vec<ProviderFailure>),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    #[error("Pipeline {pipeline_id} failed at step '{step_id}' after {attempts} attempts: {message}")]
    StepExhausted {
        pipeline_id: String,
        step_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Pipeline {id} is {status}, expected {expected}")]
    PipelineState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Render(RenderError),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ProviderError> for ForgeError {
    fn from(err: ProviderError) -> Self {
        ForgeError::Provider(err)
    }
}

impl From<RenderError> for ForgeError {
    fn from(err: RenderError) -> Self {
        ForgeError::Render(err)
    }
}

impl From<ValidationError> for ForgeError {
    fn from(err: ValidationError) -> Self {
        ForgeError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error class is handled internally by fallback/retry
    /// (only surfaced once every avenue is exhausted)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(e) => !e.is_fatal(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
