use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct RouterMetrics {
    questions_total: AtomicU64,
    template_matches_total: AtomicU64,
    fallback_dispatched_total: AtomicU64,
    fallback_completed_total: AtomicU64,
    fallback_errors_total: AtomicU64,
    unavailable_total: AtomicU64,
    total_match_micros: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub questions_total: u64,
    pub template_matches_total: u64,
    pub fallback_dispatched_total: u64,
    pub fallback_completed_total: u64,
    pub fallback_errors_total: u64,
    pub unavailable_total: u64,
    pub avg_match_micros: f64,
}

impl RouterMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_question(&self) {
        self.questions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_template_match(&self) {
        self.template_matches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback_dispatched(&self) {
        self.fallback_dispatched_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback_completed(&self, failed: bool) {
        self.fallback_completed_total
            .fetch_add(1, Ordering::Relaxed);
        if failed {
            self.fallback_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_unavailable(&self) {
        self.unavailable_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_match_latency(&self, duration: Duration) {
        self.total_match_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let questions = self.questions_total.load(Ordering::Relaxed);
        let latency = self.total_match_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            questions_total: questions,
            template_matches_total: self.template_matches_total.load(Ordering::Relaxed),
            fallback_dispatched_total: self.fallback_dispatched_total.load(Ordering::Relaxed),
            fallback_completed_total: self.fallback_completed_total.load(Ordering::Relaxed),
            fallback_errors_total: self.fallback_errors_total.load(Ordering::Relaxed),
            unavailable_total: self.unavailable_total.load(Ordering::Relaxed),
            avg_match_micros: if questions == 0 {
                0.0
            } else {
                latency as f64 / questions as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,querylens_agents=info,querylens_ml=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
