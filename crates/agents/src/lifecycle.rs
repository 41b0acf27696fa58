use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use querylens_core::{GenerationResult, RequestEvent, RequestId, RequestState};
use querylens_observability::RouterMetrics;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Per-request validity flag checked by the worker before it starts a
/// request.
#[derive(Debug, Clone)]
pub(crate) struct ValidityToken(Arc<AtomicBool>);

impl ValidityToken {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tracks in-flight fallback requests and emits their lifecycle events.
/// Shared between the orchestrator and its worker.
#[derive(Clone)]
pub(crate) struct Lifecycle {
    pending: Arc<Mutex<HashMap<RequestId, ValidityToken>>>,
    events: mpsc::UnboundedSender<RequestEvent>,
    metrics: Arc<RouterMetrics>,
}

impl Lifecycle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<RequestEvent>,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            metrics,
        }
    }

    pub(crate) fn dispatch(&self, id: RequestId) -> ValidityToken {
        let token = ValidityToken::new();
        self.pending.lock().insert(id, token.clone());
        self.metrics.inc_fallback_dispatched();
        info!(request_id = %id, "fallback dispatched");
        self.emit(id, RequestState::Dispatched);
        token
    }

    pub(crate) fn running(&self, id: RequestId) {
        debug!(request_id = %id, "fallback running");
        self.emit(id, RequestState::Running);
    }

    /// Clears the request from the busy set before the event goes out, so a
    /// caller that sees `Completed` never sees the request still pending.
    pub(crate) fn complete(&self, id: RequestId, result: GenerationResult) {
        self.pending.lock().remove(&id);
        self.metrics.inc_fallback_completed(result.is_error());
        info!(request_id = %id, failed = result.is_error(), "fallback completed");
        self.emit(id, RequestState::Completed(result));
    }

    pub(crate) fn abandon(&self, id: RequestId) -> bool {
        match self.pending.lock().get(&id) {
            Some(token) => {
                token.invalidate();
                true
            }
            None => false,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn emit(&self, id: RequestId, state: RequestState) {
        if self.events.send(RequestEvent::new(id, state)).is_err() {
            debug!(request_id = %id, "event receiver dropped");
        }
    }
}
