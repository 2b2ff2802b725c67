//! End-to-end cloaking of a single input

use std::path::Path;
use std::time::Instant;

use ac_audio::{normalize_peak, resample, AudioLoader};
use ac_core::{argmax, CloakError, CloakResult, FeatureTensor, Label, LossTerms, Waveform};
use ac_dsp::FeatureExtractor;
use ac_eval::{
    conduct_technical_test, evaluate_cloak, perceptual_distance, CloakReport, Evaluation,
    TechnicalReport,
};
use ac_model::{Model, SharedModel};

use crate::apply::{apply_features, resynthesize};
use crate::config::{AttackTarget, CloakConfig};
use crate::initializer::initialize;
use crate::objective::{AttackMode, LossEvaluator};
use crate::optimizer::{CancelFlag, Optimizer, Termination};

/// Everything produced by one cloaking run
#[derive(Debug, Clone)]
pub struct CloakOutcome {
    /// Input after loading and normalization
    pub original: Waveform,
    pub cloaked: Waveform,

    pub features: FeatureTensor,
    pub perturbation: FeatureTensor,
    pub cloaked_features: FeatureTensor,

    pub termination: Termination,
    pub iterations: usize,
    /// Loss at the returned perturbation
    pub final_loss: LossTerms,

    /// Model verdict on `cloaked_features`
    pub evaluation: Evaluation,

    /// Prediction on features re-extracted from the cloaked audio
    pub resynthesized_label: Label,

    pub perceptual_distance: f64,
    pub original_label: Label,
    pub model: String,
    pub mode: String,
    pub technical: Option<TechnicalReport>,
}

impl CloakOutcome {
    pub fn report(&self, input: impl Into<String>) -> CloakReport {
        let mut report = CloakReport::new(input, self.model.clone(), self.original_label)
            .with_mode(self.mode.clone())
            .with_optimization(self.termination.as_str(), self.iterations)
            .with_evaluation(&self.evaluation)
            .with_perceptual_distance(self.perceptual_distance)
            .with_final_loss(self.final_loss);
        if let Some(technical) = &self.technical {
            report = report.with_technical(technical.clone());
        }
        report
    }
}

/// Load → extract → initialize → optimize → apply → evaluate
pub struct Cloaker {
    model: SharedModel,
    config: CloakConfig,
    extractor: FeatureExtractor,
    loader: AudioLoader,
    cancel: Option<CancelFlag>,
}

impl Cloaker {
    pub fn new(model: SharedModel, config: CloakConfig) -> CloakResult<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::new(config.features.clone())?;
        let loader = AudioLoader::new(config.loader.clone());
        Ok(Self {
            model,
            config,
            extractor,
            loader,
            cancel: None,
        })
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &CloakConfig {
        &self.config
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn cloak_file<P: AsRef<Path>>(&self, path: P) -> CloakResult<CloakOutcome> {
        let path = path.as_ref();
        log::info!("Cloaking {}", path.display());
        let waveform = self.loader.load(path)?;
        self.cloak_waveform(&waveform)
    }

    pub fn cloak_waveform(&self, input: &Waveform) -> CloakResult<CloakOutcome> {
        let start = Instant::now();
        let cfg = &self.config;

        let waveform = if cfg.normalize {
            normalize_peak(input)
        } else {
            input.clone()
        };

        let features = self.extractor.extract(&waveform)?;
        let original_label = match cfg.original_label {
            Some(label) => label,
            None => self.model.predict(&features)?,
        };
        let mode = self.resolve_mode(&waveform)?;

        log::info!(
            "Model '{}', {} attack, original label {}, features {:?}",
            self.model.name(),
            mode.describe(),
            original_label,
            features.shape()
        );

        let evaluator = LossEvaluator::new(
            self.model.clone(),
            cfg.perceptual.build(),
            mode.clone(),
            cfg.optimizer.beta,
        )?;
        let initial = initialize(&features, self.model.as_ref(), &mode, cfg.optimizer.epsilon)?;

        let mut optimizer = Optimizer::new(cfg.optimizer.clone())?;
        if let Some(flag) = &self.cancel {
            optimizer = optimizer.with_cancel_flag(flag.clone());
        }
        let optimized = optimizer.optimize(&initial, &features, &evaluator)?;

        let cloaked_features = apply_features(&features, &optimized.perturbation)?;
        let final_loss = evaluator.evaluate(&cloaked_features, &features)?;
        let evaluation = evaluate_cloak(
            std::slice::from_ref(&cloaked_features),
            self.model.as_ref(),
            original_label,
        )?;

        let cloaked = resynthesize(
            &waveform,
            &optimized.perturbation,
            &cfg.features,
            cfg.amplitude_clamp,
        )?;
        let resynthesized_label = self.model.predict(&self.extractor.extract(&cloaked)?)?;
        let distance = perceptual_distance(&waveform, &cloaked)?;
        let technical = if cfg.technical_report {
            Some(conduct_technical_test(&waveform, &cloaked)?)
        } else {
            None
        };

        log::info!(
            "Cloaking {} after {} iterations in {:.2?}: success rate {:.2}, perceptual distance {:.4}",
            optimized.termination,
            optimized.iterations,
            start.elapsed(),
            evaluation.success_rate,
            distance
        );
        if resynthesized_label == original_label && evaluation.all_evaded() {
            log::warn!("Resynthesized audio is still classified as label {}", original_label);
        }

        Ok(CloakOutcome {
            original: waveform,
            cloaked,
            features,
            perturbation: optimized.perturbation,
            cloaked_features,
            termination: optimized.termination,
            iterations: optimized.iterations,
            final_loss,
            evaluation,
            resynthesized_label,
            perceptual_distance: distance,
            original_label,
            model: self.model.name().to_string(),
            mode: mode.describe(),
            technical,
        })
    }

    /// Turn the configured target into an attack mode for `waveform`
    ///
    /// Target audio is brought to the input's sample rate, mixed to mono and
    /// truncated or zero-padded to the input's length before extraction.
    pub fn resolve_mode(&self, waveform: &Waveform) -> CloakResult<AttackMode> {
        match &self.config.target {
            AttackTarget::Untargeted => Ok(AttackMode::Untargeted),
            AttackTarget::Label(label) => {
                if let Some(classes) = self.model.num_classes() {
                    if *label >= classes {
                        return Err(CloakError::InvalidConfig(format!(
                            "target label {} out of range for {} classes",
                            label, classes
                        )));
                    }
                }
                Ok(AttackMode::TargetLabel(*label))
            }
            AttackTarget::Audio(path) => {
                let mut target = self.loader.load(path)?;
                if target.sample_rate() != waveform.sample_rate() {
                    target = resample(&target, waveform.sample_rate())?;
                }
                if self.config.normalize {
                    target = normalize_peak(&target);
                }
                let mut samples = target.mono_samples();
                samples.resize(waveform.num_frames(), 0.0);
                let features = self.extractor.extract_samples(&samples, waveform.sample_rate())?;
                Ok(AttackMode::TargetFeatures(features))
            }
        }
    }

    /// Predicted label and scores for a waveform, without cloaking
    pub fn classify(&self, waveform: &Waveform) -> CloakResult<(Label, Vec<f32>)> {
        let features = self.extractor.extract(waveform)?;
        let scores = self.model.scores(&features)?;
        let label = argmax(&scores).ok_or_else(|| {
            CloakError::Inference(format!("model '{}' produced no scores", self.model.name()))
        })?;
        Ok((label, scores))
    }
}
