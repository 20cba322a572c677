//! Configuration: figment-merged defaults, TOML files, and env vars.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{Config, DispatcherConfig, GenerationConfig, PipelineConfig, RenderConfig};
