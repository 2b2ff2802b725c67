//! Configuration for cloaking runs

use std::path::{Path, PathBuf};

use ac_audio::LoaderConfig;
use ac_core::{CloakError, CloakResult, Label};
use ac_dsp::FeatureParams;
use serde::{Deserialize, Serialize};

use crate::apply::AmplitudeClamp;
use crate::objective::PerceptualLoss;

/// Step rule applied to the gradient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum UpdateRule {
    /// `p ← p − α·g`
    #[default]
    GradientDescent,
    /// `v ← decay·v + g`, `p ← p − α·v`
    Momentum { decay: f32 },
}

/// Perturbation optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Iteration budget (0 = return the initial perturbation)
    pub max_iterations: usize,

    /// Step size α
    pub learning_rate: f32,

    /// Weight of the perceptual term
    pub beta: f32,

    /// Stop once mean |gradient| drops below this
    pub convergence_tolerance: f32,

    /// Per-element perturbation bound
    pub epsilon: f32,

    /// Clamp to `[-epsilon, epsilon]` after every step
    pub clamp_perturbation: bool,

    pub update_rule: UpdateRule,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            learning_rate: 0.01,
            beta: 1.0,
            convergence_tolerance: 0.001,
            epsilon: 0.05,
            clamp_perturbation: true,
            update_rule: UpdateRule::GradientDescent,
        }
    }
}

impl OptimizerConfig {
    /// Short budget, larger steps
    pub fn fast() -> Self {
        Self {
            max_iterations: 25,
            learning_rate: 0.02,
            convergence_tolerance: 0.005,
            ..Default::default()
        }
    }

    /// Long budget, small steps with momentum
    pub fn thorough() -> Self {
        Self {
            max_iterations: 500,
            learning_rate: 0.005,
            convergence_tolerance: 0.0001,
            update_rule: UpdateRule::Momentum { decay: 0.9 },
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_learning_rate(mut self, rate: f32) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp_perturbation = clamp;
        self
    }

    pub fn with_update_rule(mut self, rule: UpdateRule) -> Self {
        self.update_rule = rule;
        self
    }

    pub fn validate(&self) -> CloakResult<()> {
        fn positive(name: &str, value: f32) -> CloakResult<()> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(CloakError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        }

        positive("learning_rate", self.learning_rate)?;
        positive("convergence_tolerance", self.convergence_tolerance)?;
        positive("epsilon", self.epsilon)?;

        if !(self.beta >= 0.0 && self.beta.is_finite()) {
            return Err(CloakError::InvalidConfig(format!(
                "beta must be non-negative, got {}",
                self.beta
            )));
        }
        if let UpdateRule::Momentum { decay } = self.update_rule {
            if !(0.0..1.0).contains(&decay) {
                return Err(CloakError::InvalidConfig(format!(
                    "momentum decay must be in [0, 1), got {}",
                    decay
                )));
            }
        }
        Ok(())
    }
}

/// Serializable attack selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum AttackTarget {
    /// Push the model away from its current prediction
    #[default]
    Untargeted,
    /// Pull the model towards a class
    Label(Label),
    /// Pull the features towards those of another recording
    Audio(PathBuf),
}

/// Everything a cloaking run needs besides the model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloakConfig {
    pub optimizer: OptimizerConfig,
    pub features: FeatureParams,
    pub loader: LoaderConfig,
    pub target: AttackTarget,
    pub perceptual: PerceptualLoss,

    /// Label to evade; None = the model's prediction on the clean input
    pub original_label: Option<Label>,

    pub amplitude_clamp: AmplitudeClamp,

    /// Peak-normalize input audio before feature extraction
    pub normalize: bool,

    /// Attach spectral and level measurements to reports
    pub technical_report: bool,
}

impl Default for CloakConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            features: FeatureParams::default(),
            loader: LoaderConfig::default(),
            target: AttackTarget::Untargeted,
            perceptual: PerceptualLoss::Euclidean,
            original_label: None,
            amplitude_clamp: AmplitudeClamp::On,
            normalize: true,
            technical_report: true,
        }
    }
}

impl CloakConfig {
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_features(mut self, features: FeatureParams) -> Self {
        self.features = features;
        self
    }

    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_target(mut self, target: AttackTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_perceptual(mut self, perceptual: PerceptualLoss) -> Self {
        self.perceptual = perceptual;
        self
    }

    pub fn with_original_label(mut self, label: Label) -> Self {
        self.original_label = Some(label);
        self
    }

    pub fn with_amplitude_clamp(mut self, clamp: AmplitudeClamp) -> Self {
        self.amplitude_clamp = clamp;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn validate(&self) -> CloakResult<()> {
        self.optimizer.validate()?;
        self.features.validate()?;
        if self.loader.target_sample_rate == Some(0) {
            return Err(CloakError::InvalidConfig("target sample rate must be positive".into()));
        }
        Ok(())
    }

    /// Read a JSON configuration file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CloakResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CloakError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: CloakConfig = serde_json::from_str(&text)
            .map_err(|e| CloakError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> CloakResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CloakError::InvalidConfig(format!("config serialization: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.beta, 1.0);
        assert_eq!(config.convergence_tolerance, 0.001);
        assert_eq!(config.epsilon, 0.05);
        assert!(config.clamp_perturbation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(OptimizerConfig::fast().validate().is_ok());
        assert!(OptimizerConfig::thorough().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let bad = [
            OptimizerConfig::default().with_learning_rate(0.0),
            OptimizerConfig::default().with_beta(-1.0),
            OptimizerConfig::default().with_tolerance(0.0),
            OptimizerConfig::default().with_epsilon(-0.05),
            OptimizerConfig::default().with_update_rule(UpdateRule::Momentum { decay: 1.5 }),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(CloakError::InvalidConfig(_))));
        }
        // beta = 0 disables the perceptual term and is allowed
        assert!(OptimizerConfig::default().with_beta(0.0).validate().is_ok());
    }

    #[test]
    fn test_json_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloak.json");
        std::fs::write(
            &path,
            r#"{ "optimizer": { "epsilon": 0.1, "max_iterations": 10 }, "target": { "Label": 3 } }"#,
        )
        .unwrap();

        let config = CloakConfig::from_json_file(&path).unwrap();
        assert_eq!(config.optimizer.epsilon, 0.1);
        assert_eq!(config.optimizer.max_iterations, 10);
        assert_eq!(config.optimizer.learning_rate, 0.01);
        assert_eq!(config.target, AttackTarget::Label(3));
        assert_eq!(config.amplitude_clamp, AmplitudeClamp::On);
    }

    #[test]
    fn test_json_round_trip() {
        let config = CloakConfig::default()
            .with_optimizer(OptimizerConfig::thorough())
            .with_original_label(2);
        let json = config.to_json().unwrap();
        let back: CloakConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.optimizer, config.optimizer);
        assert_eq!(back.original_label, Some(2));
    }

    #[test]
    fn test_invalid_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CloakConfig::from_json_file(&path),
            Err(CloakError::InvalidConfig(_))
        ));
    }
}
