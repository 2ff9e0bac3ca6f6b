use tracing::debug;

use crate::biometrics::features::feature_vector;
use crate::biometrics::minutiae::extract_minutiae;
use crate::biometrics::quality::assess_quality;
use crate::biometrics::types::{Minutia, RidgeImage};
use crate::config::{EngineConfig, NeighbourhoodRule};

/// Per-image analysis used by both enrollment and verification.
pub trait SampleAnalyzer {
    fn quality(&self, image: &RidgeImage) -> f64;
    fn feature_vector(&self, image: &RidgeImage) -> Vec<f64>;
    fn extract_minutiae(&self, image: &RidgeImage) -> Vec<Minutia>;
}

#[derive(Debug, Clone, Copy)]
pub struct RidgeAnalyzer {
    max_minutiae: usize,
    neighbourhood: NeighbourhoodRule,
}

impl RidgeAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_minutiae: config.max_minutiae_per_sample,
            neighbourhood: config.neighbourhood,
        }
    }
}

impl Default for RidgeAnalyzer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SampleAnalyzer for RidgeAnalyzer {
    fn quality(&self, image: &RidgeImage) -> f64 {
        let report = assess_quality(image);
        debug!(
            contrast = report.contrast,
            ridge_clarity = report.ridge_clarity,
            focus = report.focus,
            orientation = report.orientation_consistency,
            coverage = report.coverage,
            score = report.score,
            "scored capture"
        );
        report.score
    }

    fn feature_vector(&self, image: &RidgeImage) -> Vec<f64> {
        feature_vector(image)
    }

    fn extract_minutiae(&self, image: &RidgeImage) -> Vec<Minutia> {
        extract_minutiae(image, self.max_minutiae, &self.neighbourhood)
    }
}
