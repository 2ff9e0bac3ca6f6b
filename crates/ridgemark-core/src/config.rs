use crate::biometrics::types::MinutiaKind;

pub const DEFAULT_REQUIRED_SAMPLE_COUNT: usize = 5;
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_MINUTIAE_PER_SAMPLE: usize = 100;
pub const DEFAULT_STABLE_MINUTIAE_CAP: usize = 50;
pub const DEFAULT_HIGH_CONFIDENCE: f64 = 0.8;
pub const DEFAULT_MEDIUM_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_MAX_CAPTURE_ATTEMPTS: u32 = 25;
pub const DEFAULT_NEIGHBOURHOOD: NeighbourhoodRule = NeighbourhoodRule {
    ending_min: 2,
    ending_max: 4,
    bifurcation_min: 5,
    bifurcation_max: 8,
};

/// Bounds on the number of bright cells in a 7x7 gradient window that
/// classify a candidate point. Unvalidated heuristic; keep tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourhoodRule {
    pub ending_min: usize,
    pub ending_max: usize,
    pub bifurcation_min: usize,
    pub bifurcation_max: usize,
}

impl NeighbourhoodRule {
    pub fn classify(&self, bright_cells: usize) -> Option<MinutiaKind> {
        if (self.ending_min..=self.ending_max).contains(&bright_cells) {
            Some(MinutiaKind::RidgeEnding)
        } else if (self.bifurcation_min..=self.bifurcation_max).contains(&bright_cells) {
            Some(MinutiaKind::Bifurcation)
        } else {
            None
        }
    }
}

impl Default for NeighbourhoodRule {
    fn default() -> Self {
        DEFAULT_NEIGHBOURHOOD
    }
}

/// Tunables shared by every stage of the engine. Passed by reference into
/// each component; nothing reads global state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub required_sample_count: usize,
    pub quality_threshold: f64,
    pub consistency_threshold: f64,
    pub max_minutiae_per_sample: usize,
    pub stable_minutiae_cap: usize,
    pub verification_high_confidence: f64,
    pub verification_medium_confidence: f64,
    pub max_capture_attempts: u32,
    pub neighbourhood: NeighbourhoodRule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            required_sample_count: DEFAULT_REQUIRED_SAMPLE_COUNT,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
            max_minutiae_per_sample: DEFAULT_MAX_MINUTIAE_PER_SAMPLE,
            stable_minutiae_cap: DEFAULT_STABLE_MINUTIAE_CAP,
            verification_high_confidence: DEFAULT_HIGH_CONFIDENCE,
            verification_medium_confidence: DEFAULT_MEDIUM_CONFIDENCE,
            max_capture_attempts: DEFAULT_MAX_CAPTURE_ATTEMPTS,
            neighbourhood: NeighbourhoodRule::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_splits_endings_and_bifurcations() {
        let rule = NeighbourhoodRule::default();
        assert_eq!(rule.classify(1), None);
        assert_eq!(rule.classify(2), Some(MinutiaKind::RidgeEnding));
        assert_eq!(rule.classify(4), Some(MinutiaKind::RidgeEnding));
        assert_eq!(rule.classify(5), Some(MinutiaKind::Bifurcation));
        assert_eq!(rule.classify(8), Some(MinutiaKind::Bifurcation));
        assert_eq!(rule.classify(9), None);
    }
}
