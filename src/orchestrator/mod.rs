//! Orchestration Facade
//!
//! Wires a user request through analysis → dispatch → extraction for
//! single-shot use, or through the full step pipeline for multi-stage
//! generation. Owns the engine, the dispatcher, the cancel registry, and
//! the artifact store handle; completed pipelines are persisted
//! best-effort in the background, while explicit saves surface failures.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, GenerationConfig};
use crate::extract::extract;
use crate::pipeline::{
    CancelRegistry, EngineConfig, GenerationStepSet, Pipeline, PipelineEngine, PipelineStatus,
    default_steps, latest_raw,
};
use crate::provider::{
    CancelToken, ChatMessage, DispatchStats, DispatcherConfig, FallbackDispatcher, GenerationCall,
};
use crate::storage::SharedStore;
use crate::types::{
    Artifact, ForgeError, GenerationOptions, GenerationRequest, Result,
};

/// Storage key prefix for persisted artifact sets
const ARTIFACT_PREFIX: &str = "artifact/";

pub struct Orchestrator {
    engine: Arc<PipelineEngine>,
    dispatcher: Arc<FallbackDispatcher>,
    cancels: Arc<CancelRegistry>,
    store: SharedStore,
    generation: GenerationConfig,
}

impl Orchestrator {
    /// Build the full wiring from configuration
    pub fn from_config(config: &Config, store: SharedStore) -> Result<Self> {
        let dispatcher = Arc::new(FallbackDispatcher::from_specs(
            &config.providers,
            DispatcherConfig::from_config(&config.dispatcher),
        )?);
        Ok(Self::new(
            dispatcher,
            store,
            EngineConfig::from_config(&config.pipeline),
            config.generation.clone(),
        ))
    }

    /// Build from parts (tests wire stub providers through here)
    pub fn new(
        dispatcher: Arc<FallbackDispatcher>,
        store: SharedStore,
        engine_config: EngineConfig,
        generation: GenerationConfig,
    ) -> Self {
        let engine = Arc::new(PipelineEngine::new(engine_config));
        let cancels = Arc::new(CancelRegistry::new());
        GenerationStepSet::new(dispatcher.clone(), cancels.clone(), generation.clone())
            .register(&engine);

        Self {
            engine,
            dispatcher,
            cancels,
            store,
            generation,
        }
    }

    // =========================================================================
    // Pipeline Submission
    // =========================================================================

    /// Submit a request as a full step pipeline; returns the pipeline id
    /// immediately while execution proceeds in the background.
    pub async fn start(
        &self,
        request: GenerationRequest,
        options: GenerationOptions,
    ) -> Result<String> {
        let steps = default_steps(&options);
        let id = self.engine.create(request, steps);
        info!(pipeline = %id, "Generation session started");

        let engine = self.engine.clone();
        let store = self.store.clone();
        let cancels = self.cancels.clone();
        let pipeline_id = id.clone();
        tokio::spawn(async move {
            match engine.run(&pipeline_id).await {
                Ok(PipelineStatus::Completed) => {
                    // Background persistence is best-effort; the explicit
                    // save path surfaces failures instead
                    if let Err(err) = persist_artifacts(&engine, &store, &pipeline_id).await {
                        warn!(pipeline = %pipeline_id, error = %err, "Background persist failed");
                    }
                    cancels.remove(&pipeline_id);
                }
                Ok(status) => {
                    info!(pipeline = %pipeline_id, %status, "Pipeline left running state");
                }
                Err(err) => {
                    warn!(pipeline = %pipeline_id, error = %err, "Pipeline failed");
                    cancels.remove(&pipeline_id);
                }
            }
        });

        Ok(id)
    }

    /// Snapshot of a pipeline for inspection
    pub async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        self.engine.snapshot(pipeline_id).await
    }

    /// Resume a paused pipeline, optionally carrying feedback keyed by
    /// step id. Continuation runs in the background.
    pub async fn resume(
        &self,
        pipeline_id: &str,
        feedback: Option<std::collections::HashMap<String, String>>,
    ) -> Result<()> {
        // Surface state errors now rather than inside the spawned task
        let snapshot = self.engine.snapshot(pipeline_id).await?;
        if snapshot.status != PipelineStatus::Paused {
            return Err(ForgeError::PipelineState {
                id: pipeline_id.to_string(),
                status: snapshot.status.to_string(),
                expected: "paused".to_string(),
            });
        }

        let engine = self.engine.clone();
        let store = self.store.clone();
        let id = pipeline_id.to_string();
        tokio::spawn(async move {
            match engine.resume(&id, feedback).await {
                Ok(PipelineStatus::Completed) => {
                    if let Err(err) = persist_artifacts(&engine, &store, &id).await {
                        warn!(pipeline = %id, error = %err, "Background persist failed");
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(pipeline = %id, error = %err, "Resumed pipeline failed"),
            }
        });

        Ok(())
    }

    /// Cancel a pipeline and abort its in-flight dispatch
    pub async fn cancel(&self, pipeline_id: &str) -> Result<()> {
        self.cancels.cancel(pipeline_id);
        self.engine.cancel(pipeline_id).await
    }

    // =========================================================================
    // Single-Shot Generation
    // =========================================================================

    /// Direct analysis → dispatch → extract path, no pipeline session
    pub async fn generate_once(
        &self,
        request: &GenerationRequest,
    ) -> Result<(Vec<Artifact>, DispatchStats)> {
        let analysis = crate::pipeline::analyze_description(&request.description, request);
        let call = GenerationCall {
            model: String::new(),
            messages: vec![
                ChatMessage::system(crate::pipeline::prompts::system(request.kind)),
                ChatMessage::user(crate::pipeline::prompts::generation(request, &analysis)),
            ],
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            stream: true,
        };

        let token = CancelToken::new();
        let (result, stats) = self.dispatcher.dispatch(&call, request.kind, &token).await?;
        let artifacts = extract(&result.text, request.kind);
        info!(
            provider = %result.provider,
            artifacts = artifacts.len(),
            "Single-shot generation finished"
        );
        Ok((artifacts, stats))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Explicitly save a completed pipeline's artifacts; save failures
    /// surface to the caller.
    pub async fn save_artifacts(&self, pipeline_id: &str) -> Result<String> {
        persist_artifacts(&self.engine, &self.store, pipeline_id).await
    }

    /// Load previously saved artifacts. Read failures are tolerated:
    /// logged and reported as absent.
    pub async fn load_artifacts(&self, pipeline_id: &str) -> Option<Vec<Artifact>> {
        let key = format!("{}{}", ARTIFACT_PREFIX, pipeline_id);
        let stored = match self.store.get(&key).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(pipeline = %pipeline_id, error = %err, "Artifact read failed, continuing");
                return None;
            }
        };
        match serde_json::from_str(&stored) {
            Ok(artifacts) => Some(artifacts),
            Err(err) => {
                warn!(pipeline = %pipeline_id, error = %err, "Stored artifacts unreadable");
                None
            }
        }
    }

    /// Pipeline ids with saved artifacts
    pub async fn saved_pipelines(&self) -> Result<Vec<String>> {
        let keys = self.store.list_by_prefix(ARTIFACT_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(ARTIFACT_PREFIX).map(str::to_string))
            .collect())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn pipeline_ids(&self) -> Vec<String> {
        self.engine.ids()
    }

    pub async fn provider_health(&self) -> Vec<(String, bool)> {
        self.dispatcher.health_report().await
    }
}

/// Extract and store the final artifacts of a completed pipeline
async fn persist_artifacts(
    engine: &PipelineEngine,
    store: &SharedStore,
    pipeline_id: &str,
) -> Result<String> {
    let snapshot = engine.snapshot(pipeline_id).await?;
    if snapshot.status != PipelineStatus::Completed {
        return Err(ForgeError::PipelineState {
            id: pipeline_id.to_string(),
            status: snapshot.status.to_string(),
            expected: "completed".to_string(),
        });
    }

    let raw = latest_raw(&snapshot)?;
    let artifacts = extract(&raw, snapshot.request.kind);
    let payload = serde_json::to_string(&SavedArtifacts {
        pipeline_id: pipeline_id.to_string(),
        kind: snapshot.request.kind,
        artifacts: &artifacts,
    })?;

    let key = format!("{}{}", ARTIFACT_PREFIX, pipeline_id);
    store.set(&key, payload).await?;
    Ok(key)
}

#[derive(serde::Serialize)]
struct SavedArtifacts<'a> {
    pipeline_id: String,
    kind: crate::types::TargetKind,
    artifacts: &'a [Artifact],
}
