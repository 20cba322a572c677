//! Global Constants
//!
//! Centralized defaults for configuration and tuning.
//! All magic numbers should be defined here with documentation.
//! Every value in this file is a default, not a contract: the matching
//! field in [`crate::config::Config`] overrides it.

/// Dispatcher constants
pub mod dispatcher {
    /// Fixed backoff before trying the next provider after a rate limit (seconds)
    pub const RATE_LIMIT_BACKOFF_SECS: u64 = 3;

    /// Default temperature for generation calls
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default maximum output tokens per generation call
    pub const DEFAULT_MAX_TOKENS: usize = 4096;
}

/// Pipeline engine constants
pub mod pipeline {
    /// Retries per step before the whole pipeline fails (cap+1 total attempts)
    pub const MAX_STEP_RETRIES: u32 = 2;

    /// Minimum generated-output length accepted by the validation step
    pub const MIN_OUTPUT_LEN: usize = 40;

    /// Descriptions shorter than this many words pause analysis for user input
    pub const MIN_DESCRIPTION_WORDS: usize = 3;
}

/// Render scheduler constants
pub mod render {
    /// Debounce window for coalescing repeated render requests (milliseconds)
    pub const DEBOUNCE_WINDOW_MS: u64 = 300;

    /// Global bound on simultaneous in-flight render executions
    pub const MAX_CONCURRENT_RENDERS: usize = 3;

    /// Timeout for a single sandboxed render execution (seconds)
    pub const RENDER_TIMEOUT_SECS: u64 = 10;
}

/// Extractor constants
pub mod extract {
    /// Bounding size assumed when a vector element declares no viewable area
    pub const DEFAULT_BOUNDING_SIZE: u32 = 24;

    /// Maximum length for a semantic name derived from enclosing text
    pub const MAX_TEXT_NAME_LEN: usize = 24;

    /// Cyclic fallback list of semantic names, indexed by element position
    pub const FALLBACK_NAMES: &[&str] = &[
        "home", "user", "settings", "search", "menu", "bell", "heart", "star", "mail", "calendar",
    ];
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
}
