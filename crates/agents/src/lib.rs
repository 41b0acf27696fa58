mod config;
mod lifecycle;
mod worker;

use std::sync::Arc;
use std::time::Instant;

use querylens_core::{
    is_reserved_command, normalize_text, GenerationRequest, GenerationResult, IntentCatalog,
    LensError, MatchResult, ModelState, PendingHandle, RequestEvent, RequestId, RoutingDecision,
};
use querylens_ml::{GenerativeFallbackEngine, SimilarityMatcher};
use querylens_observability::RouterMetrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

pub use config::{RouterConfig, DEFAULT_MODEL};

use lifecycle::Lifecycle;
use worker::QueuedRequest;

/// Entry point for free-text questions.
///
/// Matching runs synchronously on the caller's thread. Unmatched questions
/// are queued for a single background worker and the caller gets a
/// `Delegate` handle right away; progress arrives as `RequestEvent`s on the
/// receiver returned by [`RoutingOrchestrator::start`].
pub struct RoutingOrchestrator {
    catalog: Arc<IntentCatalog>,
    matcher: SimilarityMatcher,
    engine: Option<Arc<GenerativeFallbackEngine>>,
    config: RouterConfig,
    metrics: Arc<RouterMetrics>,
    lifecycle: Lifecycle,
    queue: mpsc::UnboundedSender<QueuedRequest>,
    worker: Option<JoinHandle<()>>,
}

impl RoutingOrchestrator {
    /// Must be called inside a Tokio runtime; the fallback worker is spawned
    /// here when an engine is supplied.
    pub fn start(
        matcher: SimilarityMatcher,
        engine: Option<GenerativeFallbackEngine>,
        config: RouterConfig,
        metrics: Arc<RouterMetrics>,
    ) -> (Self, mpsc::UnboundedReceiver<RequestEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let lifecycle = Lifecycle::new(events_tx, metrics.clone());

        let engine = engine.map(Arc::new);
        let worker = engine
            .clone()
            .map(|engine| tokio::spawn(worker::run(engine, queue_rx, lifecycle.clone())));

        info!(
            threshold = config.threshold,
            fallback = engine.is_some(),
            intents = matcher.catalog().len(),
            "routing orchestrator started"
        );

        let orchestrator = Self {
            catalog: matcher.catalog().clone(),
            matcher,
            engine,
            config,
            metrics,
            lifecycle,
            queue: queue_tx,
            worker,
        };
        (orchestrator, events_rx)
    }

    pub fn catalog(&self) -> &Arc<IntentCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// `None` when no fallback engine was configured.
    pub fn model_state(&self) -> Option<ModelState> {
        self.engine.as_ref().map(|engine| engine.state())
    }

    /// True while any dispatched request has not yet completed.
    pub fn is_busy(&self) -> bool {
        self.lifecycle.pending() > 0
    }

    pub fn pending(&self) -> usize {
        self.lifecycle.pending()
    }

    /// Starts loading the model in the background instead of on the first
    /// fallback request.
    pub fn warm_up(&self) -> Option<JoinHandle<ModelState>> {
        self.engine.clone().map(|engine| {
            tokio::spawn(async move { engine.model().initialize().await })
        })
    }

    /// Returns `None` for empty or whitespace-only input; nothing is matched
    /// or dispatched in that case.
    #[instrument(skip(self, extra_context))]
    pub fn route(
        &self,
        question: &str,
        extra_context: Option<&str>,
    ) -> Result<Option<RoutingDecision>, LensError> {
        let normalized = normalize_text(question);
        if normalized.is_empty() {
            return Ok(None);
        }

        if is_reserved_command(&normalized) {
            return Ok(Some(RoutingDecision::EndSession));
        }

        self.metrics.inc_question();
        let started = Instant::now();
        let outcome = self.matcher.match_question(&normalized, self.config.threshold);
        self.metrics.observe_match_latency(started.elapsed());

        let decision = match outcome {
            MatchResult::Matched { intent_id, score } => {
                let template = self.catalog.template_for(&intent_id)?.to_string();
                self.metrics.inc_template_match();
                info!(intent = %intent_id, score, "routed to report template");
                RoutingDecision::UseTemplate {
                    intent_id,
                    template,
                    score,
                }
            }
            MatchResult::NoMatch => match &self.engine {
                Some(engine) if !engine.state().is_failed() => {
                    RoutingDecision::Delegate(self.dispatch(&normalized, extra_context))
                }
                _ => {
                    self.metrics.inc_unavailable();
                    warn!("no intent matched and fallback model is unavailable");
                    RoutingDecision::Unavailable
                }
            },
        };

        Ok(Some(decision))
    }

    /// Marks a pending request as no longer wanted. A request the worker has
    /// not started yet completes with an error instead of running; one that
    /// is already running finishes normally. Returns false for unknown or
    /// already completed handles.
    pub fn abandon(&self, handle: PendingHandle) -> bool {
        self.lifecycle.abandon(handle.id)
    }

    /// The prompt the fallback engine would build for this question.
    pub fn fallback_prompt(&self, question: &str, extra_context: Option<&str>) -> Option<String> {
        self.engine
            .as_ref()
            .map(|engine| engine.prompt_for(&self.generation_request(question, extra_context)))
    }

    /// Stops accepting work and waits for queued requests to finish.
    pub async fn shutdown(mut self) {
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(error = %err, "fallback worker ended abnormally");
            }
        }
    }

    fn generation_request(&self, question: &str, extra_context: Option<&str>) -> GenerationRequest {
        GenerationRequest::new(normalize_text(question))
            .with_catalog_context(self.config.catalog_context)
            .with_extra_context(extra_context.map(str::to_string))
    }

    fn dispatch(&self, question: &str, extra_context: Option<&str>) -> PendingHandle {
        let id = RequestId::new();
        let request = self.generation_request(question, extra_context);
        let token = self.lifecycle.dispatch(id);

        if let Err(rejected) = self.queue.send(QueuedRequest { id, request, token }) {
            warn!(request_id = %rejected.0.id, "fallback worker is gone");
            self.lifecycle.complete(
                id,
                GenerationResult::Error("fallback worker stopped".to_string()),
            );
        }

        PendingHandle { id }
    }
}
