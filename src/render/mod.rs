//! Render Scheduling
//!
//! Debounce coalescing, a global concurrency bound, pre-render structural
//! validation, and classification of sandbox failures. The rendering
//! surface itself is an external collaborator behind the [`Renderer`]
//! trait.

mod scheduler;
mod validate;

pub use scheduler::{
    RenderOptions, RenderResult, RenderScheduler, RenderStats, Renderer, SchedulerConfig,
    SharedRenderer, Theme, ViewportClass,
};
pub use validate::validate_component_source;
