use std::sync::Arc;

use querylens_core::{IntentCatalog, LensError, MatchResult};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;

pub const DEFAULT_THRESHOLD: f32 = 0.75;

struct IndexedExample {
    intent: usize,
    embedding: Vec<f32>,
}

/// Nearest-example intent matcher.
///
/// Example embeddings are computed once at construction, in catalog order and
/// then example order. Scanning keeps the first maximum it sees, so on equal
/// scores the earlier-registered intent wins.
pub struct SimilarityMatcher {
    catalog: Arc<IntentCatalog>,
    embedder: Arc<dyn EmbeddingProvider>,
    examples: Vec<IndexedExample>,
}

impl SimilarityMatcher {
    pub fn new(
        catalog: Arc<IntentCatalog>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, LensError> {
        embedder.check_available()?;

        let examples = catalog
            .list_intents()
            .iter()
            .enumerate()
            .flat_map(|(position, intent)| {
                intent.examples.iter().map(move |example| (position, example))
            })
            .map(|(intent, example)| IndexedExample {
                intent,
                embedding: embedder.embed(example),
            })
            .collect::<Vec<_>>();

        info!(
            embedder = embedder.model_name(),
            intents = catalog.len(),
            examples = examples.len(),
            "similarity matcher ready"
        );

        Ok(Self {
            catalog,
            embedder,
            examples,
        })
    }

    pub fn catalog(&self) -> &Arc<IntentCatalog> {
        &self.catalog
    }

    pub fn match_question(&self, question: &str, threshold: f32) -> MatchResult {
        let query = self.embedder.embed(question);

        let mut best_intent: Option<usize> = None;
        let mut best_score = 0.0_f32;

        for example in &self.examples {
            let score = self.embedder.similarity(&query, &example.embedding);
            if score > best_score {
                best_score = score;
                best_intent = Some(example.intent);
            }
        }

        let intent = best_intent.and_then(|position| self.catalog.list_intents().get(position));
        match intent {
            Some(intent) if best_score >= threshold => {
                debug!(intent = %intent.id, score = best_score, "intent matched");
                MatchResult::Matched {
                    intent_id: intent.id.clone(),
                    score: best_score,
                }
            }
            _ => {
                debug!(
                    closest = intent.map(|intent| intent.id.as_str()),
                    score = best_score,
                    threshold,
                    "no intent above threshold"
                );
                MatchResult::NoMatch
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbeddingProvider;
    use querylens_core::Intent;

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

    struct OfflineEmbedder;

    impl EmbeddingProvider for OfflineEmbedder {
        fn model_name(&self) -> &str {
            "offline"
        }

        fn check_available(&self) -> Result<(), LensError> {
            Err(LensError::EmbeddingUnavailable("weights missing".to_string()))
        }

        fn embed(&self, _text: &str) -> Vec<f32> {
            Vec::new()
        }
    }

    fn builtin_matcher() -> SimilarityMatcher {
        SimilarityMatcher::new(
            Arc::new(IntentCatalog::builtin().unwrap()),
            Arc::new(HashEmbeddingProvider::default()),
        )
        .unwrap()
    }

    #[test]
    fn every_example_recalls_its_own_intent() {
        let matcher = builtin_matcher();
        let catalog = IntentCatalog::builtin().unwrap();
        for intent in catalog.list_intents() {
            for example in &intent.examples {
                match matcher.match_question(example, DEFAULT_THRESHOLD) {
                    MatchResult::Matched { intent_id, score } => {
                        assert_eq!(intent_id, intent.id, "example: {example}");
                        assert!(score >= DEFAULT_THRESHOLD);
                    }
                    MatchResult::NoMatch => panic!("no match for own example: {example}"),
                }
            }
        }
    }

    #[test]
    fn equal_scores_keep_first_registered_intent() {
        let catalog = IntentCatalog::new(vec![
            Intent::new("first", ["alpha"], "SELECT 1"),
            Intent::new("second", ["beta"], "SELECT 2"),
        ])
        .unwrap();
        let matcher =
            SimilarityMatcher::new(Arc::new(catalog), Arc::new(ConstantEmbedder(0.9))).unwrap();

        assert_eq!(
            matcher.match_question("anything", DEFAULT_THRESHOLD),
            MatchResult::Matched {
                intent_id: "first".to_string(),
                score: 0.9
            }
        );
    }

    #[test]
    fn empty_catalog_never_matches() {
        let matcher = SimilarityMatcher::new(
            Arc::new(IntentCatalog::default()),
            Arc::new(ConstantEmbedder(1.0)),
        )
        .unwrap();
        assert_eq!(matcher.match_question("anything", 0.0), MatchResult::NoMatch);
    }

    #[test]
    fn below_threshold_is_no_match() {
        let matcher = builtin_matcher();
        assert_eq!(
            matcher.match_question("what's the weather today", DEFAULT_THRESHOLD),
            MatchResult::NoMatch
        );
        assert_eq!(matcher.match_question("", DEFAULT_THRESHOLD), MatchResult::NoMatch);
    }

    #[test]
    fn unavailable_embedder_fails_construction() {
        let result = SimilarityMatcher::new(
            Arc::new(IntentCatalog::builtin().unwrap()),
            Arc::new(OfflineEmbedder),
        );
        assert!(matches!(result, Err(LensError::EmbeddingUnavailable(_))));
    }
}
