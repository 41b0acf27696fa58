use std::sync::Arc;

use querylens_core::{GenerationRequest, GenerationResult, IntentCatalog, ModelState};
use tracing::{debug, instrument, warn};

use crate::generation::DecodingPolicy;
use crate::model::ModelHandle;
use crate::postprocess::post_process;
use crate::prompt::build_prompt;

/// Answers questions no intent matched, using the shared model handle and a
/// catalog-aware prompt.
#[derive(Clone)]
pub struct GenerativeFallbackEngine {
    catalog: Arc<IntentCatalog>,
    model: Arc<ModelHandle>,
    policy: DecodingPolicy,
}

impl GenerativeFallbackEngine {
    pub fn new(catalog: Arc<IntentCatalog>, model: Arc<ModelHandle>) -> Self {
        Self {
            catalog,
            model,
            policy: DecodingPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DecodingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn policy(&self) -> &DecodingPolicy {
        &self.policy
    }

    pub fn state(&self) -> ModelState {
        self.model.state()
    }

    pub fn prompt_for(&self, request: &GenerationRequest) -> String {
        build_prompt(&self.catalog, request)
    }

    /// Never fails: initialization and generation errors become
    /// `GenerationResult::Error`. Nothing is retried.
    #[instrument(skip(self, request), fields(model = %self.model.model_name()))]
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let prompt = self.prompt_for(request);
        debug!(prompt_chars = prompt.len(), "fallback prompt built");

        match self.model.generate(&prompt, &self.policy).await {
            Ok(raw) => GenerationResult::Text(post_process(&raw)),
            Err(err) => {
                warn!(error = %err, "fallback generation failed");
                GenerationResult::Error(err.to_string())
            }
        }
    }
}
