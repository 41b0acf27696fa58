use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generation::{DecodingPolicy, GenerationError, GenerationProvider};

/// Generation over an Ollama-compatible HTTP endpoint (`/api/tags`,
/// `/api/generate`).
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    model: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize, PartialEq)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    num_predict: usize,
    repeat_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl HttpGenerationProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| GenerationError::Initialization(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: RwLock::new(None),
        })
    }
}

/// Maps the decoding policy onto endpoint options. Greedy decoding becomes
/// temperature 0 with top-k 1; the endpoint has no n-gram blocking, so the
/// repetition penalty carries loop suppression alone.
fn options_for(policy: &DecodingPolicy) -> GenerateOptions {
    let greedy = !policy.do_sample && policy.num_beams <= 1;
    GenerateOptions {
        temperature: if greedy { 0.0 } else { 0.7 },
        top_k: if greedy { 1 } else { 40 },
        num_predict: policy.max_new_tokens,
        repeat_penalty: policy.repetition_penalty,
        stop: if policy.early_stopping {
            vec!["\nQuestion:".to_string()]
        } else {
            Vec::new()
        },
    }
}

fn model_listed(models: &[TagEntry], wanted: &str) -> bool {
    models.iter().any(|entry| {
        entry.name == wanted
            || entry
                .name
                .strip_prefix(wanted)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn initialize(&self, model_name: &str) -> Result<(), GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        let tags: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| GenerationError::Initialization(err.to_string()))?
            .json()
            .await
            .map_err(|err| GenerationError::Initialization(err.to_string()))?;

        if !model_listed(&tags.models, model_name) {
            return Err(GenerationError::Initialization(format!(
                "model `{model_name}` is not served by {}",
                self.base_url
            )));
        }

        *self.model.write() = Some(model_name.to_string());
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        policy: &DecodingPolicy,
    ) -> Result<String, GenerationError> {
        let model = self
            .model
            .read()
            .clone()
            .ok_or_else(|| GenerationError::Failed("provider not initialized".to_string()))?;

        let body = GenerateBody {
            model: &model,
            prompt,
            stream: false,
            options: options_for(policy),
        };

        debug!(model = %model, "posting generation request");
        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| GenerationError::Failed(err.to_string()))?
            .json()
            .await
            .map_err(|err| GenerationError::Failed(err.to_string()))?;

        Ok(response.response)
    }
}
