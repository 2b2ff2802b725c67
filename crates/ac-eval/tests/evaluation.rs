//! Evaluating a cloaked waveform against its original

use ac_core::Waveform;
use ac_dsp::{FeatureExtractor, FeatureParams};
use ac_eval::{
    conduct_technical_test, evaluate_cloak, perceptual_distance, CloakReport, ReportFormat,
    TechnicalReport,
};
use ac_model::{LinearModel, Model};
use approx::assert_relative_eq;

const RATE: u32 = 16000;

fn tone(amplitude: f32) -> Waveform {
    let samples = (0..RATE as usize / 4)
        .map(|i| (2.0 * std::f32::consts::PI * 500.0 * i as f32 / RATE as f32).sin() * amplitude)
        .collect();
    Waveform::mono(samples, RATE).unwrap()
}

fn with_hiss(wave: &Waveform) -> Waveform {
    let samples = wave
        .samples()
        .iter()
        .enumerate()
        .map(|(i, s)| s + ((i * 7919 % 101) as f32 / 101.0 - 0.5) * 0.05)
        .collect();
    wave.with_samples(samples).unwrap()
}

#[test]
fn scaled_copy_is_spectrally_identical() {
    let original = tone(0.5);
    let quieter = tone(0.25);

    let distance = perceptual_distance(&original, &quieter).unwrap();
    assert!(distance < 1e-4, "distance {}", distance);

    let technical = conduct_technical_test(&original, &quieter).unwrap();
    assert_relative_eq!(
        technical.get(TechnicalReport::PEAK_DELTA_DB).unwrap(),
        -6.0206,
        epsilon = 1e-3
    );
    assert_relative_eq!(
        technical.get(TechnicalReport::RMS_DELTA_DB).unwrap(),
        -6.0206,
        epsilon = 1e-3
    );
}

#[test]
fn added_noise_moves_the_spectrum() {
    let original = tone(0.5);
    let noisy = with_hiss(&original);

    assert!(perceptual_distance(&original, &noisy).unwrap() > 0.0);
    let technical = conduct_technical_test(&original, &noisy).unwrap();
    assert!(technical.get(TechnicalReport::MAX_SAMPLE_DELTA).unwrap() > 0.0);
}

#[test]
fn report_reflects_the_evaluation() {
    let extractor = FeatureExtractor::new(FeatureParams::compact()).unwrap();
    let original = tone(0.5);
    let cloaked = with_hiss(&original);
    let features = extractor.extract(&cloaked).unwrap();

    let model = LinearModel::uniform(
        "detector",
        features.shape().to_vec(),
        &[0.001, -0.001, 0.0],
        vec![0.0, 0.0, 0.5],
    )
    .unwrap();
    let original_label = model.predict(&extractor.extract(&original).unwrap()).unwrap();
    let evaluation = evaluate_cloak(std::slice::from_ref(&features), &model, original_label).unwrap();

    let report = CloakReport::new("voice.wav", model.name(), original_label)
        .with_evaluation(&evaluation)
        .with_perceptual_distance(perceptual_distance(&original, &cloaked).unwrap())
        .with_technical(conduct_technical_test(&original, &cloaked).unwrap());

    assert_eq!(report.predicted_label, Some(evaluation.predicted_labels[0]));
    assert_eq!(report.evaded(), evaluation.predicted_labels[0] != original_label);
    assert_eq!(report.model_output, evaluation.model_output[0]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voice.report.json");
    report.save(&path, ReportFormat::Json).unwrap();

    let restored: CloakReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(restored.model, "detector");
    assert_eq!(restored.original_label, original_label);
    assert_eq!(restored.technical, report.technical);
}
