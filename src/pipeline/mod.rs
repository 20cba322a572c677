//! Step Pipeline Engine
//!
//! A generic ordered-step workflow executor with per-step retry,
//! pause-for-input, cancellation, and duration tracking. One Pipeline per
//! generation session; pipelines run independently with no shared mutable
//! state between them.
//!
//! ## Modules
//!
//! - `engine`: registry-owning executor with run/resume/cancel
//! - `steps`: the default generation step sequence and its handlers

mod engine;
mod steps;

pub use engine::{EngineConfig, PipelineEngine};
pub use steps::{GenerationStepSet, default_steps, handler_ids};
pub(crate) use steps::{analyze_description, latest_raw, prompts};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::provider::CancelToken;
use crate::types::{GenerationRequest, Result};

// =============================================================================
// Step & Pipeline Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// One step record. Mutated only by the engine while executing its own
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    /// Human-readable name for status output
    pub name: String,
    /// Handler id resolved through the engine's registry
    pub handler: String,
    pub status: StepStatus,
    /// Failed attempts so far (total attempts = retries, capped at cap+1)
    pub retries: u32,
    /// Accumulated execution time across attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Opaque result payload, readable by later steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PipelineStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            handler: handler.into(),
            status: StepStatus::Pending,
            retries: 0,
            duration_ms: None,
            result: None,
            last_error: None,
        }
    }
}

/// One stateful multi-step generation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub request: GenerationRequest,
    pub steps: Vec<PipelineStep>,
    pub current_step: usize,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// User feedback keyed by step id, merged in on resume
    pub feedback: HashMap<String, String>,
    #[serde(skip)]
    pub(crate) cancel_requested: bool,
}

impl Pipeline {
    pub fn new(request: GenerationRequest, steps: Vec<PipelineStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            steps,
            current_step: 0,
            status: PipelineStatus::Pending,
            started_at: None,
            ended_at: None,
            feedback: HashMap::new(),
            cancel_requested: false,
        }
    }

    /// Result payload of an earlier completed step
    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.steps
            .iter()
            .find(|s| s.id == step_id && s.status == StepStatus::Completed)
            .and_then(|s| s.result.as_ref())
    }

    pub fn feedback_for(&self, step_id: &str) -> Option<&str> {
        self.feedback.get(step_id).map(String::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Completed | PipelineStatus::Failed
        )
    }

    /// The step record at the current index
    pub fn current(&self) -> Option<&PipelineStep> {
        self.steps.get(self.current_step)
    }
}

// =============================================================================
// Step Handlers
// =============================================================================

/// What a handler produced: a result payload, or a request to pause the
/// pipeline for user input without advancing
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: Value,
    pub needs_user_input: bool,
}

impl StepOutcome {
    pub fn done(result: Value) -> Self {
        Self {
            result,
            needs_user_input: false,
        }
    }

    pub fn pause(result: Value) -> Self {
        Self {
            result,
            needs_user_input: true,
        }
    }
}

/// One executable step. Handlers receive the pipeline snapshot so later
/// steps can read earlier steps' results; they never mutate pipeline state
/// directly.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, pipeline: &Pipeline, step: &PipelineStep) -> Result<StepOutcome>;
}

// =============================================================================
// Cancellation Registry
// =============================================================================

/// Explicit owned registry of per-pipeline cancel tokens, so cancelling a
/// pipeline also aborts its in-flight streaming dispatch
#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<String, CancelToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a pipeline, created on first use
    pub fn token_for(&self, pipeline_id: &str) -> CancelToken {
        self.tokens
            .entry(pipeline_id.to_string())
            .or_default()
            .clone()
    }

    pub fn cancel(&self, pipeline_id: &str) {
        if let Some(token) = self.tokens.get(pipeline_id) {
            token.cancel();
        }
    }

    pub fn remove(&self, pipeline_id: &str) {
        self.tokens.remove(pipeline_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetKind;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            GenerationRequest::new("three icons", TargetKind::IconPack),
            vec![
                PipelineStep::new("a", "First", "h-a"),
                PipelineStep::new("b", "Second", "h-b"),
            ],
        )
    }

    #[test]
    fn test_new_pipeline_starts_pending() {
        let p = pipeline();
        assert_eq!(p.status, PipelineStatus::Pending);
        assert_eq!(p.current_step, 0);
        assert!(!p.is_terminal());
        assert!(p.started_at.is_none());
    }

    #[test]
    fn test_step_result_requires_completion() {
        let mut p = pipeline();
        p.steps[0].result = Some(serde_json::json!({"x": 1}));
        // Not completed yet: invisible to later steps
        assert!(p.step_result("a").is_none());
        p.steps[0].status = StepStatus::Completed;
        assert_eq!(p.step_result("a").expect("result")["x"], 1);
    }

    #[test]
    fn test_cancel_registry_shares_tokens() {
        let registry = CancelRegistry::new();
        let token = registry.token_for("p1");
        assert!(!token.is_cancelled());
        registry.cancel("p1");
        assert!(token.is_cancelled());
        // Unknown ids are a no-op
        registry.cancel("p2");
    }
}
