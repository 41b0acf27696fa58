use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("model initialization failed: {0}")]
    Initialization(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

/// Fixed decoding parameters for fallback answers: greedy, single beam,
/// short output, with repetition suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingPolicy {
    pub max_new_tokens: usize,
    pub num_beams: usize,
    pub do_sample: bool,
    pub repetition_penalty: f32,
    pub no_repeat_ngram_size: usize,
    pub early_stopping: bool,
}

impl Default for DecodingPolicy {
    fn default() -> Self {
        Self {
            max_new_tokens: 64,
            num_beams: 1,
            do_sample: false,
            repetition_penalty: 1.2,
            no_repeat_ngram_size: 3,
            early_stopping: true,
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Called at most once per model handle.
    async fn initialize(&self, model_name: &str) -> Result<(), GenerationError>;

    async fn generate(&self, prompt: &str, policy: &DecodingPolicy)
        -> Result<String, GenerationError>;
}

/// Provider used when no generation backend is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledGenerationProvider;

#[async_trait]
impl GenerationProvider for DisabledGenerationProvider {
    async fn initialize(&self, _model_name: &str) -> Result<(), GenerationError> {
        Err(GenerationError::Initialization(
            "no generation backend configured".to_string(),
        ))
    }

    async fn generate(
        &self,
        _prompt: &str,
        _policy: &DecodingPolicy,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Failed(
            "no generation backend configured".to_string(),
        ))
    }
}
