//! Pipeline Executor
//!
//! Owns the pipeline registry and drives step execution: strictly ordered
//! steps, an explicit counter-bounded retry loop per step, pause on
//! `needs_user_input`, resume from the same index, and cancellation that
//! abandons further execution without rolling back completed side effects.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{Pipeline, PipelineStatus, StepHandler, StepStatus};
use crate::types::{ForgeError, GenerationRequest, Result};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retries per step before the whole pipeline fails (cap+1 attempts)
    pub max_step_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_step_retries: crate::constants::pipeline::MAX_STEP_RETRIES,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self {
            max_step_retries: config.max_step_retries,
        }
    }
}

type SharedPipeline = Arc<RwLock<Pipeline>>;

/// Registry-owning step executor.
///
/// The pipeline map is an explicit owned store: created empty, populated
/// via `create`, entries removed via `remove`. Pass the engine by handle
/// to anything needing it.
pub struct PipelineEngine {
    pipelines: DashMap<String, SharedPipeline>,
    handlers: DashMap<String, Arc<dyn StepHandler>>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            pipelines: DashMap::new(),
            handlers: DashMap::new(),
            config,
        }
    }

    /// Register a step handler under its id
    pub fn register_handler(&self, id: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(id.into(), handler);
    }

    /// Create a pipeline in `pending` state and return its id
    pub fn create(&self, request: GenerationRequest, steps: Vec<super::PipelineStep>) -> String {
        let pipeline = Pipeline::new(request, steps);
        let id = pipeline.id.clone();
        self.pipelines
            .insert(id.clone(), Arc::new(RwLock::new(pipeline)));
        debug!(pipeline = %id, "Pipeline created");
        id
    }

    /// Clone a snapshot of the pipeline for inspection
    pub async fn snapshot(&self, id: &str) -> Result<Pipeline> {
        let entry = self.get(id)?;
        let pipeline = entry.read().await;
        Ok(pipeline.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.pipelines.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove a pipeline from the registry (archival is the caller's job)
    pub fn remove(&self, id: &str) {
        self.pipelines.remove(id);
    }

    /// Execute steps from the current index until the pipeline completes,
    /// fails, or pauses for user input.
    #[instrument(skip(self), fields(pipeline = %id))]
    pub async fn run(&self, id: &str) -> Result<PipelineStatus> {
        let entry = self.get(id)?;

        {
            let mut pipeline = entry.write().await;
            match pipeline.status {
                PipelineStatus::Pending => {
                    pipeline.status = PipelineStatus::InProgress;
                    pipeline.started_at = Some(chrono::Utc::now());
                }
                PipelineStatus::InProgress => {}
                status => {
                    return Err(ForgeError::PipelineState {
                        id: id.to_string(),
                        status: status.to_string(),
                        expected: "pending or in-progress".to_string(),
                    });
                }
            }
        }

        self.run_steps(&entry, id).await
    }

    /// Resume a paused pipeline from the same step index, merging optional
    /// feedback keyed by step id
    pub async fn resume(
        &self,
        id: &str,
        feedback: Option<std::collections::HashMap<String, String>>,
    ) -> Result<PipelineStatus> {
        let entry = self.get(id)?;

        {
            let mut pipeline = entry.write().await;
            if pipeline.status != PipelineStatus::Paused {
                return Err(ForgeError::PipelineState {
                    id: id.to_string(),
                    status: pipeline.status.to_string(),
                    expected: "paused".to_string(),
                });
            }
            if let Some(feedback) = feedback {
                pipeline.feedback.extend(feedback);
            }
            pipeline.status = PipelineStatus::InProgress;
            info!(pipeline = %id, step = pipeline.current_step, "Pipeline resumed");
        }

        self.run_steps(&entry, id).await
    }

    /// Cancel a pipeline: mark it failed and abandon further execution.
    /// Side effects of already-completed steps are not rolled back.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let entry = self.get(id)?;
        let mut pipeline = entry.write().await;

        if pipeline.is_terminal() {
            return Ok(());
        }

        pipeline.cancel_requested = true;
        // A pipeline with no task in flight terminates right here; a
        // running one notices the flag after the current handler returns.
        if matches!(
            pipeline.status,
            PipelineStatus::Pending | PipelineStatus::Paused
        ) {
            finish_cancelled(&mut pipeline);
        }
        info!(pipeline = %id, "Pipeline cancelled");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<SharedPipeline> {
        self.pipelines
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ForgeError::PipelineNotFound(id.to_string()))
    }

    async fn run_steps(&self, entry: &SharedPipeline, id: &str) -> Result<PipelineStatus> {
        loop {
            // Snapshot under the lock, execute outside it
            let (index, handler_id, snapshot) = {
                let mut pipeline = entry.write().await;

                if pipeline.cancel_requested {
                    finish_cancelled(&mut pipeline);
                    return Ok(PipelineStatus::Failed);
                }

                if pipeline.current_step >= pipeline.steps.len() {
                    pipeline.status = PipelineStatus::Completed;
                    pipeline.ended_at = Some(chrono::Utc::now());
                    info!(pipeline = %id, steps = pipeline.steps.len(), "Pipeline completed");
                    return Ok(PipelineStatus::Completed);
                }

                let index = pipeline.current_step;
                pipeline.steps[index].status = StepStatus::InProgress;
                let handler_id = pipeline.steps[index].handler.clone();
                (index, handler_id, pipeline.clone())
            };

            let Some(handler) = self.handlers.get(&handler_id).map(|h| h.value().clone()) else {
                let mut pipeline = entry.write().await;
                pipeline.steps[index].status = StepStatus::Failed;
                pipeline.status = PipelineStatus::Failed;
                pipeline.ended_at = Some(chrono::Utc::now());
                return Err(ForgeError::Config(format!(
                    "no handler registered for '{}'",
                    handler_id
                )));
            };

            let step_snapshot = snapshot.steps[index].clone();
            debug!(pipeline = %id, step = %step_snapshot.id, attempt = step_snapshot.retries + 1, "Executing step");

            let attempt_start = std::time::Instant::now();
            let outcome = handler.execute(&snapshot, &step_snapshot).await;
            let elapsed_ms = attempt_start.elapsed().as_millis() as u64;

            let mut pipeline = entry.write().await;

            if pipeline.cancel_requested {
                finish_cancelled(&mut pipeline);
                return Ok(PipelineStatus::Failed);
            }

            let step = &mut pipeline.steps[index];
            step.duration_ms = Some(step.duration_ms.unwrap_or(0) + elapsed_ms);

            match outcome {
                Ok(outcome) if outcome.needs_user_input => {
                    // No advancement: resume continues from this index
                    step.result = Some(outcome.result);
                    pipeline.status = PipelineStatus::Paused;
                    info!(pipeline = %id, step = %step_snapshot.id, "Pipeline paused for user input");
                    return Ok(PipelineStatus::Paused);
                }
                Ok(outcome) => {
                    step.status = StepStatus::Completed;
                    step.result = Some(outcome.result);
                    pipeline.current_step += 1;
                }
                Err(err) => {
                    step.retries += 1;
                    step.last_error = Some(err.to_string());

                    if step.retries > self.config.max_step_retries {
                        step.status = StepStatus::Failed;
                        let attempts = step.retries;
                        let step_id = step.id.clone();

                        // Later steps depend on earlier results; no skipping
                        // ahead past a failure
                        for later in pipeline.steps[index + 1..].iter_mut() {
                            later.status = StepStatus::Skipped;
                        }
                        pipeline.status = PipelineStatus::Failed;
                        pipeline.ended_at = Some(chrono::Utc::now());

                        warn!(
                            pipeline = %id,
                            step = %step_id,
                            attempts,
                            error = %err,
                            "Step exhausted retries, pipeline failed"
                        );
                        return Err(ForgeError::StepExhausted {
                            pipeline_id: id.to_string(),
                            step_id,
                            attempts,
                            message: err.to_string(),
                        });
                    }

                    debug!(
                        pipeline = %id,
                        step = %step_snapshot.id,
                        retries = step.retries,
                        "Step failed, retrying same step"
                    );
                }
            }
        }
    }
}

fn finish_cancelled(pipeline: &mut Pipeline) {
    if let Some(step) = pipeline.steps.get_mut(pipeline.current_step)
        && step.status == StepStatus::InProgress
    {
        step.status = StepStatus::Skipped;
    }
    pipeline.status = PipelineStatus::Failed;
    pipeline.ended_at = Some(chrono::Utc::now());
}
