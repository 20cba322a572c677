//! Render Scheduler
//!
//! Debounces and concurrency-bounds repeated render requests per artifact
//! identity. Repeated calls for the same id within the debounce window
//! coalesce: only the last call's payload is rendered, the per-id timer is
//! replaced (never stacked), and the settled result is broadcast to every
//! caller still awaiting. A global semaphore bounds simultaneous render
//! executions across all jobs; a saturated bound fails fast instead of
//! queuing without limit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::validate::validate_component_source;
use crate::types::{Artifact, RenderError, RenderErrorKind};

// =============================================================================
// Options, Results, Stats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewportClass {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RenderOptions {
    pub theme: Theme,
    pub viewport: ViewportClass,
}

/// Outcome of one settled render window
#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
    pub errors: Vec<RenderError>,
    pub warnings: Vec<String>,
    pub render_time_ms: u64,
    pub estimated_size_bytes: usize,
}

impl RenderResult {
    fn failure(error: RenderError, estimated_size_bytes: usize) -> Self {
        Self {
            success: false,
            rendered: None,
            errors: vec![error],
            warnings: Vec::new(),
            render_time_ms: 0,
            estimated_size_bytes,
        }
    }
}

/// Rolling per-artifact performance stats, observability only
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderStats {
    pub last_ms: u64,
    pub total_ms: u64,
    pub render_count: u64,
    pub average_ms: u64,
}

impl RenderStats {
    fn record(&mut self, elapsed_ms: u64) {
        self.last_ms = elapsed_ms;
        self.total_ms += elapsed_ms;
        self.render_count += 1;
        self.average_ms = self.total_ms / self.render_count;
    }
}

// =============================================================================
// Renderer (external collaborator)
// =============================================================================

/// The sandboxed execution surface: runs markup/script and reports the
/// rendered output or the thrown error's text
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        artifact: &Artifact,
        options: &RenderOptions,
    ) -> std::result::Result<String, String>;
}

pub type SharedRenderer = Arc<dyn Renderer>;

// =============================================================================
// Scheduler
// =============================================================================

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub max_concurrent: usize,
    pub render_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(crate::constants::render::DEBOUNCE_WINDOW_MS),
            max_concurrent: crate::constants::render::MAX_CONCURRENT_RENDERS,
            render_timeout: Duration::from_secs(crate::constants::render::RENDER_TIMEOUT_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(config: &crate::config::RenderConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            max_concurrent: config.max_concurrent,
            render_timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }
}

struct PendingWindow {
    seq: u64,
    artifact: Artifact,
    options: RenderOptions,
    tx: broadcast::Sender<RenderResult>,
    /// The live debounce timer; replaced, not stacked, on each request
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RenderJob {
    seq: u64,
    pending: Option<PendingWindow>,
    stats: RenderStats,
    last_errors: Vec<RenderError>,
}

struct SchedulerInner {
    jobs: DashMap<String, Arc<Mutex<RenderJob>>>,
    permits: Semaphore,
    renderer: SharedRenderer,
    config: SchedulerConfig,
}

/// Debounced, concurrency-bounded render scheduler.
///
/// The job map is an explicit owned store: empty on construction,
/// populated per artifact id, entries removed via `clear`.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<SchedulerInner>,
}

impl RenderScheduler {
    pub fn new(renderer: SharedRenderer, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: DashMap::new(),
                permits: Semaphore::new(config.max_concurrent),
                renderer,
                config,
            }),
        }
    }

    /// Request a render for an artifact identity.
    ///
    /// Resolves after the debounce window settles with the result of the
    /// single render executed for that window. A request arriving while
    /// the global bound is saturated fails immediately with a
    /// runtime-class error instead of queuing.
    pub async fn request_render(
        &self,
        artifact_id: &str,
        artifact: Artifact,
        options: RenderOptions,
    ) -> RenderResult {
        let inner = &self.inner;

        if inner.permits.available_permits() == 0 {
            warn!(artifact = %artifact_id, "Render bound saturated, failing fast");
            return RenderResult::failure(
                RenderError::new(
                    RenderErrorKind::Runtime,
                    "too many concurrent renders; retry shortly",
                ),
                artifact.estimated_size(),
            );
        }

        let job = inner
            .jobs
            .entry(artifact_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RenderJob::default())))
            .clone();

        let mut rx = {
            let mut state = job.lock().await;
            state.seq += 1;
            let my_seq = state.seq;

            let rx = match &mut state.pending {
                Some(window) => {
                    // Coalesce: the latest payload wins the window
                    window.seq = my_seq;
                    window.artifact = artifact;
                    window.options = options;
                    if let Some(timer) = window.timer.take() {
                        timer.abort();
                    }
                    window.tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    state.pending = Some(PendingWindow {
                        seq: my_seq,
                        artifact,
                        options,
                        tx,
                        timer: None,
                    });
                    rx
                }
            };

            let timer = tokio::spawn(settle_window(
                inner.clone(),
                job.clone(),
                artifact_id.to_string(),
                my_seq,
            ));
            if let Some(window) = &mut state.pending {
                window.timer = Some(timer);
            }
            rx
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => RenderResult::failure(
                RenderError::new(
                    RenderErrorKind::Runtime,
                    "render window closed before settling",
                ),
                0,
            ),
        }
    }

    /// Rolling stats for an artifact id
    pub async fn stats(&self, artifact_id: &str) -> Option<RenderStats> {
        // Clone the Arc out so no map shard lock is held across the await
        let job = self.inner.jobs.get(artifact_id).map(|e| e.value().clone())?;
        let state = job.lock().await;
        Some(state.stats.clone())
    }

    /// Errors from the last failed render of an artifact id
    pub async fn last_errors(&self, artifact_id: &str) -> Vec<RenderError> {
        let Some(job) = self.inner.jobs.get(artifact_id).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        let state = job.lock().await;
        state.last_errors.clone()
    }

    /// Drop all state retained for an artifact id
    pub fn clear(&self, artifact_id: &str) {
        self.inner.jobs.remove(artifact_id);
    }
}

/// Wait out the debounce window, then execute the latest payload if this
/// timer was not superseded in the meantime.
async fn settle_window(
    inner: Arc<SchedulerInner>,
    job: Arc<Mutex<RenderJob>>,
    artifact_id: String,
    my_seq: u64,
) {
    tokio::time::sleep(inner.config.debounce).await;

    let window = {
        let mut state = job.lock().await;
        let latest = state
            .pending
            .as_ref()
            .map(|w| w.seq == my_seq)
            .unwrap_or(false);
        if !latest {
            // Superseded by a newer request in the same window
            return;
        }
        state.pending.take()
    };
    let Some(window) = window else { return };

    debug!(artifact = %artifact_id, seq = my_seq, "Render window settled");
    let result = execute_render(&inner, &window.artifact, &window.options).await;

    {
        let mut state = job.lock().await;
        if result.success {
            state.stats.record(result.render_time_ms);
            state.last_errors.clear();
        } else {
            state.last_errors = result.errors.clone();
        }
    }

    // Every caller that joined this window gets the same settlement
    let _ = window.tx.send(result);
}

async fn execute_render(
    inner: &SchedulerInner,
    artifact: &Artifact,
    options: &RenderOptions,
) -> RenderResult {
    let size = artifact.estimated_size();

    // Structural pre-validation short-circuits before any execution
    if let Artifact::Component(component) = artifact
        && let Err(error) = validate_component_source(&component.source_code)
    {
        return RenderResult::failure(error, size);
    }

    let Ok(_permit) = inner.permits.try_acquire() else {
        return RenderResult::failure(
            RenderError::new(
                RenderErrorKind::Runtime,
                "too many concurrent renders; retry shortly",
            ),
            size,
        );
    };

    let start = std::time::Instant::now();
    let outcome = tokio::time::timeout(
        inner.config.render_timeout,
        inner.renderer.render(artifact, options),
    )
    .await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(rendered)) => RenderResult {
            success: true,
            rendered: Some(rendered),
            errors: Vec::new(),
            warnings: Vec::new(),
            render_time_ms: elapsed_ms,
            estimated_size_bytes: size,
        },
        Ok(Err(thrown)) => {
            let mut result = RenderResult::failure(RenderError::from_failure(thrown), size);
            result.render_time_ms = elapsed_ms;
            result
        }
        Err(_) => {
            let mut result = RenderResult::failure(
                RenderError::new(
                    RenderErrorKind::Runtime,
                    format!(
                        "render timed out after {}s",
                        inner.config.render_timeout.as_secs()
                    ),
                ),
                size,
            );
            result.render_time_ms = elapsed_ms;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentArtifact, IconArtifact, IconCategory};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoRenderer {
        calls: AtomicU32,
        delay: Duration,
    }

    impl EchoRenderer {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl Renderer for EchoRenderer {
        async fn render(
            &self,
            artifact: &Artifact,
            _options: &RenderOptions,
        ) -> std::result::Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match artifact {
                Artifact::Icon(icon) => Ok(format!("rendered:{}", icon.semantic_name)),
                other => Ok(format!("rendered:{}", other.label())),
            }
        }
    }

    struct ThrowingRenderer {
        message: String,
    }

    #[async_trait]
    impl Renderer for ThrowingRenderer {
        async fn render(
            &self,
            _artifact: &Artifact,
            _options: &RenderOptions,
        ) -> std::result::Result<String, String> {
            Err(self.message.clone())
        }
    }

    fn icon(name: &str) -> Artifact {
        Artifact::Icon(IconArtifact {
            id: "icon-0".into(),
            semantic_name: name.into(),
            raw_markup: "<svg></svg>".into(),
            bounding_size: 24,
            category: IconCategory::General,
        })
    }

    fn component(source: &str) -> Artifact {
        Artifact::Component(ComponentArtifact {
            name: "X".into(),
            props_schema: serde_json::json!({}),
            source_code: source.into(),
            dependencies: vec![],
        })
    }

    fn scheduler(renderer: Arc<dyn Renderer>, debounce_ms: u64, bound: usize) -> RenderScheduler {
        RenderScheduler::new(
            renderer,
            SchedulerConfig {
                debounce: Duration::from_millis(debounce_ms),
                max_concurrent: bound,
                render_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn test_single_request_renders_after_window() {
        let renderer = EchoRenderer::instant();
        let s = scheduler(renderer.clone(), 10, 3);

        let result = s
            .request_render("a", icon("home"), RenderOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.rendered.as_deref(), Some("rendered:home"));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_debounce_coalesces_to_last_payload() {
        let renderer = EchoRenderer::instant();
        let s = scheduler(renderer.clone(), 60, 3);

        let (first, second, third) = tokio::join!(
            s.request_render("a", icon("one"), RenderOptions::default()),
            s.request_render("a", icon("two"), RenderOptions::default()),
            s.request_render("a", icon("three"), RenderOptions::default()),
        );

        // Exactly one execution, every caller sees that execution's result
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        let outputs: Vec<&str> = [&first, &second, &third]
            .iter()
            .map(|r| r.rendered.as_deref().expect("rendered"))
            .collect();
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
        // The winner is one of the three payloads, coalesced (join! order
        // is not part of the contract, but the last registered seq wins)
        assert!(outputs[0].starts_with("rendered:"));
    }

    #[tokio::test]
    async fn test_separate_windows_render_separately() {
        let renderer = EchoRenderer::instant();
        let s = scheduler(renderer.clone(), 10, 3);

        let first = s
            .request_render("a", icon("one"), RenderOptions::default())
            .await;
        let second = s
            .request_render("a", icon("two"), RenderOptions::default())
            .await;

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.rendered.as_deref(), Some("rendered:one"));
        assert_eq!(second.rendered.as_deref(), Some("rendered:two"));
    }

    #[tokio::test]
    async fn test_concurrency_bound_one_fails_fast() {
        let renderer = EchoRenderer::slow(Duration::from_millis(200));
        let s = scheduler(renderer.clone(), 5, 1);

        let (a, b) = tokio::join!(
            s.request_render("a", icon("one"), RenderOptions::default()),
            s.request_render("b", icon("two"), RenderOptions::default()),
        );

        let successes = [&a, &b].iter().filter(|r| r.success).count();
        assert_eq!(successes, 1, "exactly one render may proceed");

        let failure = if a.success { &b } else { &a };
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].kind, RenderErrorKind::Runtime);
        assert!(failure.errors[0].message.contains("too many concurrent renders"));
    }

    #[tokio::test]
    async fn test_saturated_bound_fails_at_arrival() {
        let renderer = EchoRenderer::slow(Duration::from_millis(300));
        let s = scheduler(renderer.clone(), 1, 1);

        let s2 = s.clone();
        let running =
            tokio::spawn(
                async move { s2.request_render("a", icon("one"), RenderOptions::default()).await },
            );
        // Let the first window settle and its render start
        tokio::time::sleep(Duration::from_millis(60)).await;

        let start = std::time::Instant::now();
        let rejected = s
            .request_render("b", icon("two"), RenderOptions::default())
            .await;
        assert!(!rejected.success);
        // Failed fast: no debounce wait, no queuing behind the render
        assert!(start.elapsed() < Duration::from_millis(100));

        assert!(running.await.expect("join").success);
    }

    #[tokio::test]
    async fn test_component_prevalidation_short_circuits() {
        let renderer = EchoRenderer::instant();
        let s = scheduler(renderer.clone(), 5, 3);

        let bad = component("export default function X() { return 1;");
        let result = s
            .request_render("c", bad, RenderOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.errors[0].kind, RenderErrorKind::Syntax);
        assert!(result.errors[0].position.is_some());
        // The sandbox never ran
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_thrown_error_classified_with_suggestions() {
        let renderer = Arc::new(ThrowingRenderer {
            message: "Cannot find module 'chart-kit'".into(),
        });
        let s = scheduler(renderer, 5, 3);

        let result = s
            .request_render("c", icon("one"), RenderOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.errors[0].kind, RenderErrorKind::Import);
        assert!(!result.errors[0].suggestions.is_empty());

        // The job retains the classified errors for inspection
        let errors = s.last_errors("c").await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, RenderErrorKind::Import);
    }

    #[tokio::test]
    async fn test_stats_rolling_average() {
        let renderer = EchoRenderer::slow(Duration::from_millis(20));
        let s = scheduler(renderer, 5, 3);

        s.request_render("a", icon("one"), RenderOptions::default())
            .await;
        s.request_render("a", icon("two"), RenderOptions::default())
            .await;

        let stats = s.stats("a").await.expect("stats");
        assert_eq!(stats.render_count, 2);
        assert!(stats.last_ms >= 20);
        assert_eq!(stats.average_ms, stats.total_ms / 2);
    }

    #[tokio::test]
    async fn test_clear_drops_job_state() {
        let renderer = EchoRenderer::instant();
        let s = scheduler(renderer, 5, 3);

        s.request_render("a", icon("one"), RenderOptions::default())
            .await;
        assert!(s.stats("a").await.is_some());
        s.clear("a");
        assert!(s.stats("a").await.is_none());
    }
}
