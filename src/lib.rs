//! GlyphForge - Generation Orchestration Core
//!
//! Turns a free-text generation request into structured design artifacts
//! (vector icon packs, HTML/CSS/JS bundles, component descriptions) by
//! orchestrating calls to interchangeable external generative providers.
//!
//! ## Core Features
//!
//! - **Fallback Dispatch**: ordered provider list with failure
//!   classification, rate-limit backoff, and auth fail-fast
//! - **Streaming Assembly**: incremental line-buffered decoding of
//!   chunked event streams
//! - **Step Pipeline**: ordered steps with per-step retry,
//!   pause-for-input, resume, and cancellation
//! - **Deterministic Extraction**: typed artifacts from loosely-structured
//!   generated markup
//! - **Render Scheduling**: debounce coalescing with a global concurrency
//!   bound and classified render failures
//!
//! ## Quick Start
//!
//! ```ignore
//! use glyphforge::{ConfigLoader, MemoryStore, Orchestrator};
//! use glyphforge::types::{GenerationOptions, GenerationRequest, TargetKind};
//!
//! let config = ConfigLoader::load()?;
//! let orchestrator = Orchestrator::from_config(&config, MemoryStore::shared())?;
//! let request = GenerationRequest::new("set of 5 navigation icons", TargetKind::IconPack);
//! let id = orchestrator.start(request, GenerationOptions::default()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`provider`]: provider abstraction, fallback dispatcher, stream decoder
//! - [`pipeline`]: step pipeline engine and the default generation steps
//! - [`extract`]: deterministic artifact extraction from raw markup
//! - [`render`]: debounced, bounded render scheduling
//! - [`storage`]: key-value artifact store abstraction
//! - [`orchestrator`]: the facade wiring it all together

pub mod config;
pub mod constants;
pub mod extract;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ForgeError, Result};

// Facade
pub use orchestrator::Orchestrator;

// Storage
pub use storage::{ArtifactStore, MemoryStore, SharedStore};
