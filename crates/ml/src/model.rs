use std::sync::Arc;

use parking_lot::RwLock;
use querylens_core::{LensError, ModelState};
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::generation::{DecodingPolicy, GenerationProvider};

/// The process-wide generative model resource.
///
/// Build one at startup and share it behind an `Arc`. Initialization runs at
/// most once: the first caller awaits it, later callers observe the cached
/// `Ready` or `Failed` state. Provider `generate` calls are serialized.
pub struct ModelHandle {
    model_name: String,
    provider: Arc<dyn GenerationProvider>,
    state: Arc<RwLock<ModelState>>,
    init: Arc<OnceCell<()>>,
    gate: Mutex<()>,
}

impl ModelHandle {
    pub fn new(model_name: impl Into<String>, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            model_name: model_name.into(),
            provider,
            state: Arc::new(RwLock::new(ModelState::Uninitialized)),
            init: Arc::new(OnceCell::new()),
            gate: Mutex::new(()),
        }
    }

    pub fn shared(model_name: impl Into<String>, provider: Arc<dyn GenerationProvider>) -> Arc<Self> {
        Arc::new(Self::new(model_name, provider))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn state(&self) -> ModelState {
        self.state.read().clone()
    }

    /// Loading runs in its own task: a caller that gives up waiting does not
    /// abort it, and a panicking provider leaves the handle `Failed`.
    pub async fn initialize(&self) -> ModelState {
        if self.init.initialized() {
            return self.state();
        }

        let init = self.init.clone();
        let state = self.state.clone();
        let provider = self.provider.clone();
        let model_name = self.model_name.clone();
        let loader = tokio::spawn(async move {
            init.get_or_init(|| load(provider, model_name, state)).await;
        });

        if let Err(err) = loader.await {
            warn!(model = %self.model_name, error = %err, "model loader task ended abnormally");
        }
        self.state()
    }

    pub async fn generate(&self, prompt: &str, policy: &DecodingPolicy) -> Result<String, LensError> {
        if self.initialize().await != ModelState::Ready {
            return Err(LensError::ModelUnavailable);
        }

        let _guard = self.gate.lock().await;
        self.provider
            .generate(prompt, policy)
            .await
            .map_err(|err| LensError::GenerationFailure(err.to_string()))
    }
}

async fn load(
    provider: Arc<dyn GenerationProvider>,
    model_name: String,
    state: Arc<RwLock<ModelState>>,
) {
    *state.write() = ModelState::Loading;
    info!(model = %model_name, "loading generative model");

    let attempt = {
        let model_name = model_name.clone();
        tokio::spawn(async move { provider.initialize(&model_name).await })
    };

    let next = match attempt.await {
        Ok(Ok(())) => {
            info!(model = %model_name, "generative model ready");
            ModelState::Ready
        }
        Ok(Err(err)) => {
            warn!(model = %model_name, error = %err, "generative model unavailable");
            ModelState::Failed(err.to_string())
        }
        Err(err) => {
            warn!(model = %model_name, error = %err, "generative model initialization aborted");
            ModelState::Failed(format!("model initialization aborted: {err}"))
        }
    };
    *state.write() = next;
}
