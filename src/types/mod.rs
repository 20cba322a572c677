//! Core domain types: requests, artifacts, and the unified error system.

pub mod artifact;
pub mod error;
pub mod request;

pub use artifact::{Artifact, BundleArtifact, ComponentArtifact, IconArtifact, IconCategory};
pub use error::{
    ErrorClassifier, ForgeError, ProviderError, ProviderErrorKind, ProviderFailure, RenderError,
    RenderErrorKind, Result, ValidationError,
};
pub use request::{GenerationOptions, GenerationRequest, TargetKind};
