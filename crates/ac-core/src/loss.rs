//! Objective values

use serde::{Deserialize, Serialize};

/// Loss components for one perturbation
///
/// `total = adversarial + beta * perceptual`. Recomputed on every
/// evaluation; nothing retains them between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossTerms {
    pub adversarial: f64,
    pub perceptual: f64,
    pub total: f64,
}

impl LossTerms {
    pub fn new(adversarial: f64, perceptual: f64, beta: f64) -> Self {
        Self {
            adversarial,
            perceptual,
            total: adversarial + beta * perceptual,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.adversarial.is_finite() && self.perceptual.is_finite() && self.total.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let terms = LossTerms::new(0.5, 2.0, 0.25);
        assert_eq!(terms.total, 1.0);
        assert!(terms.is_finite());
        assert!(!LossTerms::new(f64::NAN, 0.0, 1.0).is_finite());
    }
}
