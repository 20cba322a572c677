//! Default Generation Step Sequence
//!
//! analyze → structure → generate → style → optimize → validate, with an
//! opt-in variants step. Handlers read earlier results through the
//! pipeline snapshot; generation-bearing steps go through the fallback
//! dispatcher and honor the per-pipeline cancel token.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{CancelRegistry, Pipeline, PipelineStep, StepHandler, StepOutcome};
use crate::config::GenerationConfig;
use crate::constants::pipeline as consts;
use crate::provider::{ChatMessage, FallbackDispatcher, GenerationCall};
use crate::types::{ForgeError, GenerationOptions, Result, TargetKind, ValidationError};

/// Stable handler ids, also used as step ids in the default sequence
pub mod handler_ids {
    pub const ANALYZE: &str = "analyze";
    pub const STRUCTURE: &str = "structure";
    pub const GENERATE: &str = "generate";
    pub const STYLE: &str = "style";
    pub const OPTIMIZE: &str = "optimize";
    pub const VALIDATE: &str = "validate";
    pub const VARIANTS: &str = "variants";
}

/// Build the default step list for a submission
pub fn default_steps(options: &GenerationOptions) -> Vec<PipelineStep> {
    let mut steps = vec![
        PipelineStep::new(handler_ids::ANALYZE, "Analyze request", handler_ids::ANALYZE),
        PipelineStep::new(handler_ids::STRUCTURE, "Derive structure", handler_ids::STRUCTURE),
        PipelineStep::new(handler_ids::GENERATE, "Generate artifact", handler_ids::GENERATE),
        PipelineStep::new(handler_ids::STYLE, "Apply styling", handler_ids::STYLE),
        PipelineStep::new(handler_ids::OPTIMIZE, "Optimize output", handler_ids::OPTIMIZE),
        PipelineStep::new(handler_ids::VALIDATE, "Validate output", handler_ids::VALIDATE),
    ];
    if options.include_variants {
        steps.push(PipelineStep::new(
            handler_ids::VARIANTS,
            "Generate variants",
            handler_ids::VARIANTS,
        ));
    }
    steps
}

/// Shared state for the generation-bearing handlers
pub struct GenerationStepSet {
    dispatcher: Arc<FallbackDispatcher>,
    cancels: Arc<CancelRegistry>,
    generation: GenerationConfig,
}

impl GenerationStepSet {
    pub fn new(
        dispatcher: Arc<FallbackDispatcher>,
        cancels: Arc<CancelRegistry>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            dispatcher,
            cancels,
            generation,
        }
    }

    /// Register every default handler on the engine
    pub fn register(self, engine: &super::PipelineEngine) {
        let set = Arc::new(self);
        engine.register_handler(handler_ids::ANALYZE, Arc::new(AnalyzeStep));
        engine.register_handler(handler_ids::STRUCTURE, Arc::new(StructureStep));
        engine.register_handler(
            handler_ids::GENERATE,
            Arc::new(GenerateStep { set: set.clone() }),
        );
        engine.register_handler(handler_ids::STYLE, Arc::new(StyleStep { set: set.clone() }));
        engine.register_handler(handler_ids::OPTIMIZE, Arc::new(OptimizeStep));
        engine.register_handler(handler_ids::VALIDATE, Arc::new(ValidateStep));
        engine.register_handler(handler_ids::VARIANTS, Arc::new(VariantsStep { set }));
    }

    async fn dispatch(
        &self,
        pipeline: &Pipeline,
        messages: Vec<ChatMessage>,
    ) -> Result<(String, String)> {
        let call = GenerationCall {
            model: String::new(),
            messages,
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            stream: true,
        };
        let token = self.cancels.token_for(&pipeline.id);
        let (result, stats) = self
            .dispatcher
            .dispatch(&call, pipeline.request.kind, &token)
            .await?;
        debug!(
            pipeline = %pipeline.id,
            provider = %result.provider,
            attempts = stats.attempts.len(),
            "Step dispatch finished"
        );
        Ok((result.text, result.provider))
    }
}

/// Latest raw output produced so far: optimize beats style beats generate
pub(crate) fn latest_raw(pipeline: &Pipeline) -> Result<String> {
    for step_id in [handler_ids::OPTIMIZE, handler_ids::STYLE, handler_ids::GENERATE] {
        if let Some(raw) = pipeline
            .step_result(step_id)
            .and_then(|r| r.get("raw"))
            .and_then(Value::as_str)
        {
            return Ok(raw.to_string());
        }
    }
    Err(ForgeError::Validation(ValidationError::new(
        "no generated output available yet",
    )))
}

// =============================================================================
// Analyze
// =============================================================================

/// Derives a structured reading of the free-text request. Pauses for user
/// input when analysis is requested and the description is too vague to
/// act on.
struct AnalyzeStep;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "with", "and", "set", "some", "in", "on",
];

/// Deterministic reading of a request description: requested element
/// count, salient keywords, and the hints echoed through. Also used by
/// the facade's single-shot path.
pub(crate) fn analyze_description(
    description: &str,
    request: &crate::types::GenerationRequest,
) -> Value {
    let count = description
        .split_whitespace()
        .find_map(|w| w.parse::<usize>().ok())
        .filter(|n| (1..=64).contains(n))
        .unwrap_or(5);

    let keywords: Vec<String> = description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect();

    json!({
        "description": description,
        "kind": request.kind,
        "count": count,
        "keywords": keywords,
        "style": request.style_hint,
        "color": request.color_hint,
    })
}

#[async_trait]
impl StepHandler for AnalyzeStep {
    async fn execute(&self, pipeline: &Pipeline, step: &PipelineStep) -> Result<StepOutcome> {
        let request = &pipeline.request;
        let word_count = request.description.split_whitespace().count();

        if request.analyze
            && word_count < consts::MIN_DESCRIPTION_WORDS
            && pipeline.feedback_for(&step.id).is_none()
        {
            return Ok(StepOutcome::pause(json!({
                "question": "The description is very short. What should the result look like (subject, style, count)?",
            })));
        }

        let mut description = request.description.clone();
        if let Some(feedback) = pipeline.feedback_for(&step.id) {
            description = format!("{} ({})", description, feedback);
        }

        Ok(StepOutcome::done(analyze_description(&description, request)))
    }
}

// =============================================================================
// Structure
// =============================================================================

/// Derives the structure/interface plan the generation prompt is built
/// from
struct StructureStep;

#[async_trait]
impl StepHandler for StructureStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let analysis = pipeline
            .step_result(handler_ids::ANALYZE)
            .cloned()
            .unwrap_or(Value::Null);

        let count = analysis["count"].as_u64().unwrap_or(5) as usize;
        let keywords: Vec<String> = analysis["keywords"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let plan = match pipeline.request.kind {
            TargetKind::IconPack => {
                // Name the elements up front so generation and validation
                // agree on the expected count
                let names: Vec<String> = (0..count)
                    .map(|i| {
                        keywords.get(i).cloned().unwrap_or_else(|| {
                            crate::constants::extract::FALLBACK_NAMES
                                [i % crate::constants::extract::FALLBACK_NAMES.len()]
                            .to_string()
                        })
                    })
                    .collect();
                json!({"elements": names, "count": count})
            }
            TargetKind::UiBundle => json!({
                "sections": ["header", "main", "footer"],
                "count": count,
            }),
            TargetKind::Component => {
                let name = keywords
                    .iter()
                    .map(|w| {
                        let mut chars = w.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                            None => String::new(),
                        }
                    })
                    .collect::<String>();
                json!({
                    "name": if name.is_empty() { "GeneratedComponent".to_string() } else { name },
                    "props": [],
                })
            }
        };

        Ok(StepOutcome::done(plan))
    }
}

// =============================================================================
// Generate
// =============================================================================

/// Generates the primary artifact through the fallback dispatcher
struct GenerateStep {
    set: Arc<GenerationStepSet>,
}

#[async_trait]
impl StepHandler for GenerateStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let plan = pipeline
            .step_result(handler_ids::STRUCTURE)
            .cloned()
            .unwrap_or(Value::Null);

        let messages = vec![
            ChatMessage::system(prompts::system(pipeline.request.kind)),
            ChatMessage::user(prompts::generation(&pipeline.request, &plan)),
        ];
        let (raw, provider) = self.set.dispatch(pipeline, messages).await?;

        Ok(StepOutcome::done(json!({
            "raw": raw,
            "provider": provider,
        })))
    }
}

// =============================================================================
// Style
// =============================================================================

/// Applies style/color hints with a refinement call; a hint-free request
/// passes the artifact through untouched
struct StyleStep {
    set: Arc<GenerationStepSet>,
}

#[async_trait]
impl StepHandler for StyleStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let raw = latest_raw(pipeline)?;
        let request = &pipeline.request;

        if request.style_hint.is_none() && request.color_hint.is_none() {
            return Ok(StepOutcome::done(json!({"raw": raw, "styled": false})));
        }

        let messages = vec![
            ChatMessage::system(prompts::system(request.kind)),
            ChatMessage::user(prompts::styling(request, &raw)),
        ];
        let (styled, provider) = self.set.dispatch(pipeline, messages).await?;

        Ok(StepOutcome::done(json!({
            "raw": styled,
            "styled": true,
            "provider": provider,
        })))
    }
}

// =============================================================================
// Optimize
// =============================================================================

/// Deterministic cleanup: drops markup comments and collapses blank runs
struct OptimizeStep;

#[async_trait]
impl StepHandler for OptimizeStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let raw = latest_raw(pipeline)?;

        let comment_re = regex::Regex::new(r"(?s)<!--.*?-->")
            .map_err(|e| ForgeError::Config(format!("comment regex: {}", e)))?;
        let removed = comment_re.find_iter(&raw).count();
        let cleaned = comment_re.replace_all(&raw, "");

        let mut lines: Vec<&str> = Vec::new();
        let mut blank_run = 0usize;
        for line in cleaned.lines() {
            if line.trim().is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            lines.push(line);
        }

        Ok(StepOutcome::done(json!({
            "raw": lines.join("\n").trim().to_string(),
            "removed_comments": removed,
        })))
    }
}

// =============================================================================
// Validate
// =============================================================================

/// Conjunctive validation: parses as the target kind AND declares the
/// expected entry point AND passes the structural quality heuristic. Any
/// miss fails the step with actionable suggestions; the engine's normal
/// retry budget applies.
struct ValidateStep;

#[async_trait]
impl StepHandler for ValidateStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let raw = latest_raw(pipeline)?;
        let kind = pipeline.request.kind;
        let mut error: Option<ValidationError> = None;

        let parses = match kind {
            TargetKind::IconPack => !crate::extract::extract_icons(&raw).is_empty(),
            TargetKind::UiBundle => raw.to_lowercase().contains("<html"),
            TargetKind::Component => !crate::extract::extract_component(&raw)
                .name
                .is_empty(),
        };
        if !parses {
            error = Some(
                ValidationError::new(format!("output does not parse as {}", kind))
                    .suggest("regenerate with a more explicit structural prompt"),
            );
        }

        if !raw.contains(kind.entry_marker()) {
            let err = error.take().unwrap_or_else(|| {
                ValidationError::new(format!(
                    "output is missing the expected '{}' entry point",
                    kind.entry_marker()
                ))
            });
            error = Some(err.suggest(format!("ensure the output declares '{}'", kind.entry_marker())));
        }

        let quality = raw.len() >= consts::MIN_OUTPUT_LEN
            && kind.expected_keywords().iter().all(|k| raw.contains(k));
        if !quality {
            let err = error
                .take()
                .unwrap_or_else(|| ValidationError::new("output fails the quality heuristic"));
            error = Some(
                err.suggest(format!(
                    "expected non-trivial length and keywords {:?}",
                    kind.expected_keywords()
                )),
            );
        }

        if let Some(err) = error {
            return Err(ForgeError::Validation(err));
        }

        Ok(StepOutcome::done(json!({
            "valid": true,
            "length": raw.len(),
        })))
    }
}

// =============================================================================
// Variants
// =============================================================================

/// Number of stylistic variants requested per opt-in
const VARIANT_COUNT: usize = 3;

/// Optional variant generation, included only when the submission opts in
struct VariantsStep {
    set: Arc<GenerationStepSet>,
}

#[async_trait]
impl StepHandler for VariantsStep {
    async fn execute(&self, pipeline: &Pipeline, _step: &PipelineStep) -> Result<StepOutcome> {
        let raw = latest_raw(pipeline)?;
        let messages = vec![
            ChatMessage::system(prompts::system(pipeline.request.kind)),
            ChatMessage::user(prompts::variants(&pipeline.request, &raw, VARIANT_COUNT)),
        ];
        let (variants, provider) = self.set.dispatch(pipeline, messages).await?;

        Ok(StepOutcome::done(json!({
            "raw": variants,
            "count": VARIANT_COUNT,
            "provider": provider,
        })))
    }
}

// =============================================================================
// Prompt Templates
// =============================================================================

/// Prompt wording is configuration-grade string templating, not
/// architecture; kept together so it is easy to swap out.
pub(crate) mod prompts {
    use crate::types::{GenerationRequest, TargetKind};
    use serde_json::Value;

    pub fn system(kind: TargetKind) -> String {
        let output = match kind {
            TargetKind::IconPack => "inline <svg> elements",
            TargetKind::UiBundle => "a complete HTML document with embedded CSS and JS",
            TargetKind::Component => "a single exported component in plain source",
        };
        format!(
            "You are a precise design-artifact generator. Respond with {} only, no commentary.",
            output
        )
    }

    pub fn generation(request: &GenerationRequest, plan: &Value) -> String {
        let mut prompt = format!("Generate {}: {}", request.kind, request.description);
        if let Some(elements) = plan.get("elements") {
            prompt.push_str(&format!("\nExpected elements: {}", elements));
        }
        if let Some(name) = plan.get("name").and_then(Value::as_str) {
            prompt.push_str(&format!("\nComponent name: {}", name));
        }
        prompt
    }

    pub fn styling(request: &GenerationRequest, raw: &str) -> String {
        let mut prompt = String::from("Restyle the following output without changing its structure.");
        if let Some(style) = &request.style_hint {
            prompt.push_str(&format!("\nStyle: {}", style));
        }
        if let Some(color) = &request.color_hint {
            prompt.push_str(&format!("\nColors: {}", color));
        }
        prompt.push_str("\n\n");
        prompt.push_str(raw);
        prompt
    }

    pub fn variants(request: &GenerationRequest, raw: &str, count: usize) -> String {
        format!(
            "Produce {} stylistic variants of the following {}, keeping the same structure.\n\n{}",
            count, request.kind, raw
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{EngineConfig, PipelineEngine, PipelineStatus};
    use crate::provider::{
        CancelToken, DispatcherConfig, GenerationProvider, SharedProvider,
    };
    use crate::types::GenerationRequest;

    const ICON_MARKUP: &str = "<div><svg viewBox=\"0 0 24 24\"></svg><svg></svg><svg></svg><svg></svg><svg></svg></div>";

    struct FixedProvider {
        text: String,
    }

    #[async_trait]
    impl GenerationProvider for FixedProvider {
        async fn generate(&self, _call: &GenerationCall, _cancel: &CancelToken) -> Result<String> {
            Ok(self.text.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn engine_with_defaults(text: &str) -> PipelineEngine {
        let provider: SharedProvider = Arc::new(FixedProvider {
            text: text.to_string(),
        });
        let dispatcher = Arc::new(FallbackDispatcher::new(
            vec![provider],
            DispatcherConfig::default(),
        ));
        let engine = PipelineEngine::new(EngineConfig::default());
        GenerationStepSet::new(
            dispatcher,
            Arc::new(CancelRegistry::new()),
            GenerationConfig::default(),
        )
        .register(&engine);
        engine
    }

    #[test]
    fn test_default_steps_order() {
        let steps = default_steps(&GenerationOptions::default());
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["analyze", "structure", "generate", "style", "optimize", "validate"]
        );
    }

    #[test]
    fn test_variants_step_is_opt_in() {
        let with = default_steps(&GenerationOptions {
            include_variants: true,
        });
        assert_eq!(with.last().map(|s| s.id.as_str()), Some("variants"));
        let without = default_steps(&GenerationOptions::default());
        assert!(!without.iter().any(|s| s.id == "variants"));
    }

    #[tokio::test]
    async fn test_full_icon_pipeline_completes() {
        let engine = engine_with_defaults(ICON_MARKUP);
        let request = GenerationRequest::new("set of 5 navigation icons", TargetKind::IconPack);
        let id = engine.create(request, default_steps(&GenerationOptions::default()));

        let status = engine.run(&id).await.expect("run");
        assert_eq!(status, PipelineStatus::Completed);

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        let generated = snapshot.step_result("generate").expect("generate");
        assert_eq!(generated["provider"], "fixed");
        assert_eq!(snapshot.step_result("validate").expect("validate")["valid"], true);
        // No hints: styling passed through
        assert_eq!(snapshot.step_result("style").expect("style")["styled"], false);
    }

    #[tokio::test]
    async fn test_analysis_extracts_count_and_keywords() {
        let engine = engine_with_defaults(ICON_MARKUP);
        let request = GenerationRequest::new("set of 5 navigation icons", TargetKind::IconPack);
        let id = engine.create(request, default_steps(&GenerationOptions::default()));
        engine.run(&id).await.expect("run");

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        let analysis = snapshot.step_result("analyze").expect("analysis");
        assert_eq!(analysis["count"], 5);
        let keywords: Vec<&str> = analysis["keywords"]
            .as_array()
            .expect("keywords")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(keywords.contains(&"navigation"));
        assert!(!keywords.contains(&"set"));
    }

    #[tokio::test]
    async fn test_vague_analyzed_request_pauses_then_resumes() {
        let engine = engine_with_defaults(ICON_MARKUP);
        let request = GenerationRequest::new("icons", TargetKind::IconPack).with_analysis();
        let id = engine.create(request, default_steps(&GenerationOptions::default()));

        let status = engine.run(&id).await.expect("run");
        assert_eq!(status, PipelineStatus::Paused);

        let mut feedback = std::collections::HashMap::new();
        feedback.insert("analyze".to_string(), "5 outline navigation icons".to_string());
        let status = engine.resume(&id, Some(feedback)).await.expect("resume");
        assert_eq!(status, PipelineStatus::Completed);

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        let analysis = snapshot.step_result("analyze").expect("analysis");
        assert!(analysis["description"]
            .as_str()
            .expect("description")
            .contains("5 outline navigation icons"));
    }

    #[tokio::test]
    async fn test_unparseable_output_exhausts_validation_retries() {
        // Provider emits text with no svg at all; icon-pack validation
        // fails on every attempt and the pipeline fails at `validate`
        let filler = "x".repeat(80);
        let engine = engine_with_defaults(&filler);
        let request = GenerationRequest::new("three icons", TargetKind::IconPack);
        let id = engine.create(request, default_steps(&GenerationOptions::default()));

        let err = engine.run(&id).await.expect_err("should fail");
        match err {
            ForgeError::StepExhausted {
                step_id, attempts, ..
            } => {
                assert_eq!(step_id, "validate");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_styling_call_made_when_hints_present() {
        let engine = engine_with_defaults(ICON_MARKUP);
        let request = GenerationRequest::new("set of 5 icons", TargetKind::IconPack)
            .with_style("outline");
        let id = engine.create(request, default_steps(&GenerationOptions::default()));
        engine.run(&id).await.expect("run");

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        assert_eq!(snapshot.step_result("style").expect("style")["styled"], true);
    }

    #[tokio::test]
    async fn test_optimize_strips_comments() {
        let markup = "<svg></svg><!-- generator note --><svg></svg>";
        let engine = engine_with_defaults(markup);
        let request = GenerationRequest::new("two icons", TargetKind::IconPack);
        let id = engine.create(request, default_steps(&GenerationOptions::default()));
        engine.run(&id).await.expect("run");

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        let optimized = snapshot.step_result("optimize").expect("optimize");
        assert_eq!(optimized["removed_comments"], 1);
        assert!(!optimized["raw"].as_str().expect("raw").contains("generator note"));
    }

    #[tokio::test]
    async fn test_variants_step_runs_when_opted_in() {
        let engine = engine_with_defaults(ICON_MARKUP);
        let request = GenerationRequest::new("set of 5 icons", TargetKind::IconPack);
        let id = engine.create(
            request,
            default_steps(&GenerationOptions {
                include_variants: true,
            }),
        );
        engine.run(&id).await.expect("run");

        let snapshot = engine.snapshot(&id).await.expect("snapshot");
        assert_eq!(snapshot.step_result("variants").expect("variants")["count"], 3);
    }
}
