use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use querylens_agents::{RouterConfig, RoutingOrchestrator};
use querylens_core::{
    GenerationResult, Intent, IntentCatalog, MatchResult, ModelState, RequestEvent, RequestId,
    RequestState, RoutingDecision,
};
use querylens_ml::{
    post_process, DecodingPolicy, DisabledGenerationProvider, EmbeddingProvider,
    GenerationError, GenerationProvider, GenerativeFallbackEngine, ModelHandle, SimilarityMatcher,
    DEFAULT_THRESHOLD, MAX_RESPONSE_CHARS,
};
use querylens_observability::RouterMetrics;
use querylens_storage::{MemoryExecutor, QueryExecutor, TabularResult};
use tokio::sync::mpsc;

/// 1.0 for identical text, 0.1 for anything else.
struct ExactTextEmbedder;

impl EmbeddingProvider for ExactTextEmbedder {
    fn model_name(&self) -> &str {
        "exact-text"
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        text.chars().map(|ch| ch as u32 as f32).collect()
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        if a == b {
            1.0
        } else {
            0.1
        }
    }
}

struct ConstantEmbedder(f32);

impl EmbeddingProvider for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant"
    }

    fn embed(&self, _text: &str) -> Vec<f32> {
        vec![1.0]
    }

    fn similarity(&self, _a: &[f32], _b: &[f32]) -> f32 {
        self.0
    }
}

/// Replies with a fixed answer after a delay and records how many
/// generations overlap.
struct ScriptedGenerator {
    reply: String,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn initialize(&self, _model_name: &str) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        _policy: &DecodingPolicy,
    ) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if prompt.contains("Question: fail") {
            return Err(GenerationError::Failed(format!("call {call} refused")));
        }
        Ok(self.reply.clone())
    }
}

fn fraud_catalog() -> Arc<IntentCatalog> {
    Arc::new(IntentCatalog::builtin().unwrap())
}

fn router(
    embedder: Arc<dyn EmbeddingProvider>,
    provider: Arc<dyn GenerationProvider>,
) -> (RoutingOrchestrator, mpsc::UnboundedReceiver<RequestEvent>) {
    let catalog = fraud_catalog();
    let matcher = SimilarityMatcher::new(catalog.clone(), embedder).unwrap();
    let engine = GenerativeFallbackEngine::new(catalog, ModelHandle::shared("stub", provider));
    RoutingOrchestrator::start(
        matcher,
        Some(engine),
        RouterConfig::default(),
        RouterMetrics::shared(),
    )
}

async fn completion_of(
    events: &mut mpsc::UnboundedReceiver<RequestEvent>,
    id: RequestId,
) -> GenerationResult {
    while let Some(event) = events.recv().await {
        if event.id == id {
            if let RequestState::Completed(result) = event.state {
                return result;
            }
        }
    }
    panic!("event stream closed before {id} completed");
}

#[test]
fn every_example_recalls_its_own_intent() {
    let catalog = fraud_catalog();
    let matcher = SimilarityMatcher::new(catalog.clone(), Arc::new(ExactTextEmbedder)).unwrap();

    for intent in catalog.list_intents() {
        for example in &intent.examples {
            match matcher.match_question(example, DEFAULT_THRESHOLD) {
                MatchResult::Matched { intent_id, score } => {
                    assert_eq!(intent_id, intent.id, "example: {example}");
                    assert!(score >= DEFAULT_THRESHOLD);
                }
                MatchResult::NoMatch => panic!("no match for {example}"),
            }
        }
    }
}

#[test]
fn unrelated_question_does_not_match() {
    let matcher = SimilarityMatcher::new(fraud_catalog(), Arc::new(ExactTextEmbedder)).unwrap();
    assert_eq!(
        matcher.match_question("what's the weather today", DEFAULT_THRESHOLD),
        MatchResult::NoMatch
    );
}

#[test]
fn equal_scores_resolve_to_first_registered_intent() {
    let catalog = Arc::new(
        IntentCatalog::new(vec![
            Intent::new("registered_first", ["alpha"], "SELECT 1"),
            Intent::new("registered_second", ["beta"], "SELECT 2"),
        ])
        .unwrap(),
    );
    let matcher = SimilarityMatcher::new(catalog, Arc::new(ConstantEmbedder(0.9))).unwrap();

    assert_eq!(
        matcher.match_question("gamma", DEFAULT_THRESHOLD),
        MatchResult::Matched {
            intent_id: "registered_first".to_string(),
            score: 0.9,
        }
    );
}

#[tokio::test]
async fn blank_question_yields_nothing() {
    let generator = ScriptedGenerator::new("unused", Duration::ZERO);
    let (router, mut events) = router(Arc::new(ExactTextEmbedder), generator.clone());

    assert_eq!(router.route(" \n\t ", None).unwrap(), None);
    assert!(!router.is_busy());

    router.shutdown().await;
    assert!(events.recv().await.is_none());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fraud_summary_question_uses_stored_template() {
    let generator = ScriptedGenerator::new("unused", Duration::ZERO);
    let (router, _events) = router(Arc::new(ExactTextEmbedder), generator);

    let decision = router
        .route("Show monthly fraud analysis summary.", None)
        .unwrap();

    let expected = fraud_catalog()
        .template_for("fraud_analysis")
        .unwrap()
        .to_string();
    assert_eq!(
        decision,
        Some(RoutingDecision::UseTemplate {
            intent_id: "fraud_analysis".to_string(),
            template: expected,
            score: 1.0,
        })
    );
}

#[tokio::test]
async fn weather_question_is_answered_by_fallback() {
    let generator = ScriptedGenerator::new("sunny", Duration::ZERO);
    let (router, mut events) = router(Arc::new(ConstantEmbedder(0.1)), generator);

    let Some(RoutingDecision::Delegate(handle)) =
        router.route("what's the weather today", None).unwrap()
    else {
        panic!("expected the question to be delegated");
    };

    assert_eq!(
        completion_of(&mut events, handle.id).await,
        GenerationResult::Text("sunny.".to_string())
    );
}

#[tokio::test]
async fn failed_model_makes_fallback_unavailable() {
    let (router, mut events) = router(
        Arc::new(ConstantEmbedder(0.1)),
        Arc::new(DisabledGenerationProvider),
    );

    let state = router.warm_up().unwrap().await.unwrap();
    assert!(matches!(state, ModelState::Failed(_)));

    assert_eq!(
        router.route("what's the weather today", None).unwrap(),
        Some(RoutingDecision::Unavailable)
    );
    assert!(!router.is_busy());
    assert_eq!(router.metrics().snapshot().fallback_dispatched_total, 0);

    router.shutdown().await;
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn single_request_moves_through_each_state_once() {
    let generator = ScriptedGenerator::new("sunny", Duration::from_millis(5));
    let (router, mut events) = router(Arc::new(ConstantEmbedder(0.1)), generator);

    let Some(RoutingDecision::Delegate(handle)) =
        router.route("what's the weather today", None).unwrap()
    else {
        panic!("expected delegate");
    };
    router.shutdown().await;

    let mut states = Vec::new();
    while let Some(event) = events.recv().await {
        assert_eq!(event.id, handle.id);
        states.push(event.state.as_str());
    }
    assert_eq!(states, vec!["dispatched", "running", "completed"]);
}

#[tokio::test]
async fn back_to_back_requests_run_one_at_a_time() {
    let generator = ScriptedGenerator::new("done", Duration::from_millis(25));
    let (router, mut events) = router(Arc::new(ConstantEmbedder(0.1)), generator.clone());

    let Some(RoutingDecision::Delegate(first)) = router.route("first question", None).unwrap()
    else {
        panic!("expected delegate");
    };
    let Some(RoutingDecision::Delegate(second)) = router.route("second question", None).unwrap()
    else {
        panic!("expected delegate");
    };

    let mut seen = Vec::new();
    while seen
        .iter()
        .filter(|event: &&RequestEvent| event.is_completed())
        .count()
        < 2
    {
        seen.push(events.recv().await.unwrap());
    }

    let position = |id: RequestId, state: &str| {
        seen.iter()
            .position(|event| event.id == id && event.state.as_str() == state)
            .unwrap()
    };
    assert!(position(second.id, "running") > position(first.id, "completed"));
    assert_eq!(generator.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_dispatch_completes_exactly_once() {
    let generator = ScriptedGenerator::new("ok", Duration::from_millis(2));
    let (router, mut events) = router(Arc::new(ConstantEmbedder(0.1)), generator);

    let questions = ["one", "fail now", "two", "fail again", "three"];
    let mut dispatched = Vec::new();
    for question in questions {
        match router.route(question, None).unwrap() {
            Some(RoutingDecision::Delegate(handle)) => dispatched.push(handle.id),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    let metrics = router.metrics().clone();
    router.shutdown().await;

    let mut completed = Vec::new();
    while let Some(event) = events.recv().await {
        if let RequestState::Completed(result) = event.state {
            completed.push((event.id, result));
        }
    }

    assert_eq!(completed.len(), dispatched.len());
    for id in &dispatched {
        assert_eq!(completed.iter().filter(|(done, _)| done == id).count(), 1);
    }
    assert_eq!(completed.iter().filter(|(_, result)| result.is_error()).count(), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.fallback_dispatched_total, 5);
    assert_eq!(snapshot.fallback_completed_total, 5);
    assert_eq!(snapshot.fallback_errors_total, 2);
}

#[test]
fn post_processed_text_is_bounded_and_terminated() {
    let long = "word ".repeat(80);
    let samples = [
        "sunny",
        "Answer: It depends!",
        "  Question: why?  ",
        "",
        long.as_str(),
        "Fraud peaked in March, driven by online purchases",
    ];

    for raw in samples {
        let text = post_process(raw);
        assert!(text.chars().count() <= MAX_RESPONSE_CHARS, "{raw:?} -> {text:?}");
        assert!(
            text.ends_with('.') || text.ends_with('!') || text.ends_with('?'),
            "{raw:?} -> {text:?}"
        );
    }
}

#[tokio::test]
async fn report_digest_feeds_the_next_fallback_prompt() {
    let generator = ScriptedGenerator::new("March.", Duration::ZERO);
    let (router, mut events) = router(Arc::new(ExactTextEmbedder), generator);

    let Some(RoutingDecision::UseTemplate { template, .. }) = router
        .route("Show monthly fraud analysis summary.", None)
        .unwrap()
    else {
        panic!("expected template");
    };

    let executor = MemoryExecutor::new();
    executor.insert(
        &template,
        TabularResult::new(
            vec!["Month".to_string(), "Fraud_Transactions".to_string()],
            vec![vec!["2020-03".to_string(), "41".to_string()]],
        ),
    );
    let digest = executor.execute(&template).await.unwrap().digest(5).unwrap();

    let prompt = router
        .fallback_prompt("which month was worst?", Some(&digest))
        .unwrap();
    assert!(prompt.contains("Most recent result:\n"));
    assert!(prompt.contains("| 2020-03 | 41"));

    let Some(RoutingDecision::Delegate(handle)) =
        router.route("which month was worst?", Some(&digest)).unwrap()
    else {
        panic!("expected delegate");
    };
    assert_eq!(
        completion_of(&mut events, handle.id).await,
        GenerationResult::Text("March.".to_string())
    );
}
