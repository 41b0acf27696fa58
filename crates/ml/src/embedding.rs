use querylens_core::LensError;

/// Text embedding capability consumed by the matcher.
///
/// `embed` must not fail for any input, including the empty string.
/// Availability is checked once, before a matcher is built.
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    fn check_available(&self) -> Result<(), LensError> {
        Ok(())
    }

    fn embed(&self, text: &str) -> Vec<f32>;

    /// Similarity in `[0, 1]`.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b).clamp(0.0, 1.0)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut a_norm = 0.0_f64;
    let mut b_norm = 0.0_f64;

    for (lhs, rhs) in a.iter().zip(b.iter()) {
        let (lhs, rhs) = (f64::from(*lhs), f64::from(*rhs));
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        (dot / (a_norm.sqrt() * b_norm.sqrt())) as f32
    }
}

pub(crate) fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}
