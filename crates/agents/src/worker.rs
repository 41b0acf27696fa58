use std::sync::Arc;

use querylens_core::{GenerationRequest, GenerationResult, RequestId};
use querylens_ml::GenerativeFallbackEngine;
use tokio::sync::mpsc;
use tracing::warn;

use crate::lifecycle::{Lifecycle, ValidityToken};

pub(crate) struct QueuedRequest {
    pub(crate) id: RequestId,
    pub(crate) request: GenerationRequest,
    pub(crate) token: ValidityToken,
}

/// Drains the fallback queue in FIFO order, one generation at a time. Each
/// generation runs in its own task so a panicking provider still produces a
/// `Completed` event.
pub(crate) async fn run(
    engine: Arc<GenerativeFallbackEngine>,
    mut queue: mpsc::UnboundedReceiver<QueuedRequest>,
    lifecycle: Lifecycle,
) {
    while let Some(job) = queue.recv().await {
        if !job.token.is_valid() {
            lifecycle.complete(
                job.id,
                GenerationResult::Error("request abandoned".to_string()),
            );
            continue;
        }

        lifecycle.running(job.id);

        let engine = engine.clone();
        let request = job.request;
        let result = match tokio::spawn(async move { engine.generate(&request).await }).await {
            Ok(result) => result,
            Err(err) => {
                warn!(request_id = %job.id, error = %err, "generation task aborted");
                GenerationResult::Error(format!("generation task failed: {err}"))
            }
        };

        lifecycle.complete(job.id, result);
    }
}
