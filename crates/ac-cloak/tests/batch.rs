//! File-level cloaking through the model store

use std::path::Path;

use ac_audio::{write_wav, WavEncoding};
use ac_cloak::{BatchCloaker, CloakConfig, CloakJob, Cloaker, JobStatus, OptimizerConfig};
use ac_core::Waveform;
use ac_dsp::{FeatureExtractor, FeatureParams};
use ac_eval::ReportFormat;
use ac_model::{LinearModel, ModelStore};

const RATE: u32 = 22050;
const LEN: usize = 4410;

fn write_tone(path: &Path, freq: f32) {
    let samples = (0..LEN)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin() * 0.4)
        .collect();
    let wave = Waveform::mono(samples, RATE).unwrap();
    write_wav(path, &wave, WavEncoding::Float32).unwrap();
}

fn config() -> CloakConfig {
    CloakConfig::default()
        .with_features(FeatureParams::compact())
        .with_optimizer(OptimizerConfig::fast())
}

fn store(dir: &Path) -> ModelStore {
    let shape = FeatureExtractor::new(FeatureParams::compact()).unwrap().feature_shape(LEN);
    let model = LinearModel::uniform("tone", shape, &[0.002, -0.002], vec![0.0, 0.0]).unwrap();
    model.save(dir.join("tone.json")).unwrap();
    ModelStore::new(dir)
}

#[test]
fn cloak_file_and_save_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("voice.wav");
    write_tone(&input, 440.0);

    let model = store(dir.path()).load("tone").unwrap();
    let cloaker = Cloaker::new(model, config()).unwrap();
    let outcome = cloaker.cloak_file(&input).unwrap();

    assert_eq!(outcome.cloaked.sample_rate(), RATE);
    assert_eq!(outcome.cloaked.num_frames(), LEN);
    assert_eq!(outcome.perturbation.shape(), outcome.features.shape());

    let report = outcome.report(input.display().to_string());
    let report_path = dir.path().join("voice.report.md");
    report.save(&report_path, ReportFormat::Markdown).unwrap();
    assert!(std::fs::read_to_string(&report_path).unwrap().contains("tone"));
}

#[test]
fn batch_processes_every_job_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    write_tone(&a, 300.0);
    write_tone(&b, 900.0);
    let missing = dir.path().join("missing.wav");

    let model = store(dir.path()).load("tone").unwrap();
    let batch = BatchCloaker::new(model, config()).with_max_parallel(2);
    let jobs = vec![
        CloakJob::into_dir(&a, &out),
        CloakJob::into_dir(&missing, &out),
        CloakJob::into_dir(&b, &out),
    ];
    let results = batch.process_all(&jobs);

    assert_eq!(results.len(), 3);
    for (job, result) in jobs.iter().zip(&results) {
        assert_eq!(job.id, result.job_id);
    }

    assert_eq!(results[0].status, JobStatus::Completed);
    assert_eq!(results[1].status, JobStatus::Failed);
    assert!(results[1].error.as_deref().unwrap_or("").contains("missing.wav"));
    assert_eq!(results[2].status, JobStatus::Completed);

    assert!(out.join("a.cloaked.wav").exists());
    assert!(out.join("b.report.json").exists());
}

#[test]
fn failed_report_leaves_no_audio_behind() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.wav");
    write_tone(&input, 300.0);
    let output = dir.path().join("a.cloaked.wav");
    let job = CloakJob::new(&input, &output).with_report(dir.path().join("no-such-dir").join("a.json"));

    let model = store(dir.path()).load("tone").unwrap();
    let result = BatchCloaker::new(model, config()).process_job(&job);

    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.as_deref().unwrap_or("").starts_with("report"));
    assert!(!output.exists());
}

#[test]
fn cancelled_batch_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.wav");
    write_tone(&input, 300.0);

    let model = store(dir.path()).load("tone").unwrap();
    let batch = BatchCloaker::new(model, config());
    batch.cancel_flag().cancel();

    let results = batch.process_all(&[CloakJob::into_dir(&input, dir.path())]);
    assert_eq!(results[0].status, JobStatus::Cancelled);
    assert!(!dir.path().join("a.cloaked.wav").exists());
}
