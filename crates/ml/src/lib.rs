mod embedding;
mod engine;
mod fallback;
mod generation;
mod matcher;
mod model;
mod postprocess;
mod prompt;
mod remote;
mod tokenize;

#[cfg(feature = "burn-ml")]
mod burn_impl;

use std::sync::Arc;

pub use embedding::{cosine_similarity, EmbeddingProvider};
pub use engine::GenerativeFallbackEngine;
pub use fallback::HashEmbeddingProvider;
pub use generation::{DecodingPolicy, DisabledGenerationProvider, GenerationError, GenerationProvider};
pub use matcher::{SimilarityMatcher, DEFAULT_THRESHOLD};
pub use model::ModelHandle;
pub use postprocess::{post_process, MAX_RESPONSE_CHARS};
pub use prompt::{build_prompt, ROLE_PREAMBLE};
pub use remote::HttpGenerationProvider;

#[cfg(feature = "burn-ml")]
pub use burn_impl::BurnHashEmbeddingProvider;

const EMBEDDING_DIMS: usize = 256;

/// The embedder this build ships with: Burn-backed under `burn-ml`, plain
/// token hashing otherwise.
pub fn default_embedder() -> Arc<dyn EmbeddingProvider> {
    #[cfg(feature = "burn-ml")]
    {
        Arc::new(BurnHashEmbeddingProvider::new(EMBEDDING_DIMS))
    }

    #[cfg(not(feature = "burn-ml"))]
    {
        Arc::new(HashEmbeddingProvider::new(EMBEDDING_DIMS))
    }
}

/// Picks the HTTP provider when an endpoint is configured.
pub fn generation_provider(endpoint: Option<&str>) -> Arc<dyn GenerationProvider> {
    match endpoint.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => match HttpGenerationProvider::new(url) {
            Ok(provider) => Arc::new(provider),
            Err(err) => {
                tracing::warn!(endpoint = url, error = %err, "generation endpoint unusable");
                Arc::new(DisabledGenerationProvider)
            }
        },
        None => Arc::new(DisabledGenerationProvider),
    }
}
