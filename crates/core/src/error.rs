use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LensError {
    #[error("duplicate intent id `{0}`")]
    DuplicateIntent(String),

    #[error("no intent registered with id `{0}`")]
    NotFound(String),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("model not available")]
    ModelUnavailable,

    #[error("{0}")]
    GenerationFailure(String),
}
