use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchResult {
    Matched { intent_id: String, score: f32 },
    NoMatch,
}

impl MatchResult {
    pub fn intent_id(&self) -> Option<&str> {
        match self {
            Self::Matched { intent_id, .. } => Some(intent_id),
            Self::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Correlates a `Delegate` decision with the events of its fallback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingHandle {
    pub id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingDecision {
    UseTemplate {
        intent_id: String,
        template: String,
        score: f32,
    },
    Delegate(PendingHandle),
    Unavailable,
    EndSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub question: String,
    pub use_catalog_context: bool,
    pub extra_context: Option<String>,
}

impl GenerationRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            use_catalog_context: true,
            extra_context: None,
        }
    }

    pub fn with_catalog_context(mut self, enabled: bool) -> Self {
        self.use_catalog_context = enabled;
        self
    }

    pub fn with_extra_context(mut self, context: Option<String>) -> Self {
        self.extra_context = context.filter(|value| !value.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GenerationResult {
    Text(String),
    Error(String),
}

impl GenerationResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "snake_case")]
pub enum RequestState {
    Dispatched,
    Running,
    Completed(GenerationResult),
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Completed(_) => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: RequestId,
    pub state: RequestState,
    pub at: DateTime<Utc>,
}

impl RequestEvent {
    pub fn new(id: RequestId, state: RequestState) -> Self {
        Self {
            id,
            state,
            at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, RequestState::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ModelState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

impl ModelState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}
