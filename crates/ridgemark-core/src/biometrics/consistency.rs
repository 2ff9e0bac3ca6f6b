use serde::Serialize;

const NORM_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsistencyVerdict {
    /// Mean cosine similarity against the prior samples; `None` when there
    /// were none to compare with.
    pub mean_similarity: Option<f64>,
    pub consistent: bool,
}

/// Accepts a candidate whose mean similarity to every previously accepted
/// vector reaches `threshold`. The first sample of a session always passes.
pub fn check_consistency<'a, I>(candidate: &[f64], accepted: I, threshold: f64) -> ConsistencyVerdict
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for prior in accepted {
        total += cosine_similarity(candidate, prior);
        count += 1;
    }

    if count == 0 {
        return ConsistencyVerdict {
            mean_similarity: None,
            consistent: true,
        };
    }

    let mean = total / count as f64;
    ConsistencyVerdict {
        mean_similarity: Some(mean),
        consistent: mean >= threshold,
    }
}

/// Cosine similarity in `[-1, 1]`; `0` when either vector has (near) zero norm.
pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    let denominator = norm_lhs.sqrt() * norm_rhs.sqrt();
    if !denominator.is_finite() || denominator <= NORM_EPSILON {
        return 0.0;
    }
    (dot / denominator).clamp(-1.0, 1.0)
}
