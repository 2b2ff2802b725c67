//! AudioCloak command line
//!
//! Usage:
//!   audiocloak cloak voice.wav --model speaker-id      - Cloak one file
//!   audiocloak evaluate voice.wav cloaked.wav --model speaker-id --label 3
//!   audiocloak batch a.wav b.wav --model speaker-id --out-dir out
//!   audiocloak features voice.wav                      - Inspect features
//!   audiocloak models                                  - List stored models

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use ac_audio::{write_wav, AudioLoader, WavEncoding};
use ac_cloak::{
    AmplitudeClamp, AttackTarget, BatchCloaker, CloakConfig, CloakJob, Cloaker, OptimizerConfig,
    UpdateRule,
};
use ac_core::Label;
use ac_dsp::FeatureExtractor;
use ac_eval::{
    conduct_technical_test, evaluate_cloak, perceptual_distance, CloakReport, ReportFormat,
};
use ac_model::{Model, ModelStore, SharedModel};

#[derive(Parser)]
#[command(name = "audiocloak", version, about = "Adversarial audio cloaking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cloak one audio file
    Cloak {
        input: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        cloak: CloakArgs,

        /// Cloaked WAV path (default: <input>.cloaked.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report format: text, json or markdown
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },
    /// Score an already cloaked file against its original
    Evaluate {
        original: PathBuf,
        cloaked: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Label the original is known to carry
        #[arg(long)]
        label: Label,

        /// JSON configuration file (feature and loader settings)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },
    /// Cloak many files in parallel
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        cloak: CloakArgs,

        /// Directory for cloaked audio and JSON reports
        #[arg(long)]
        out_dir: PathBuf,

        /// Parallel jobs (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Write per-job results as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Print feature tensor shape and range
    Features {
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List models in the store
    Models {
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model name in the store
    #[arg(short, long)]
    model: String,

    /// Model store directory
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// Give gradient-less models a finite-difference gradient with this step
    #[arg(long)]
    fd_step: Option<f32>,
}

impl ModelArgs {
    fn load(&self) -> Result<SharedModel> {
        let mut store = ModelStore::new(&self.models_dir);
        if let Some(step) = self.fd_step {
            store = store.with_finite_difference(step);
        }
        store
            .load(&self.model)
            .with_context(|| format!("Failed to load model '{}'", self.model))
    }
}

#[derive(Args)]
struct CloakArgs {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optimizer preset: default, fast or thorough
    #[arg(long)]
    preset: Option<String>,

    /// Per-element perturbation bound
    #[arg(long)]
    epsilon: Option<f32>,

    /// Iteration budget
    #[arg(long)]
    iterations: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    /// Weight of the perceptual term
    #[arg(long)]
    beta: Option<f32>,

    /// Convergence threshold on mean |gradient|
    #[arg(long)]
    tolerance: Option<f32>,

    /// Pull the model towards this class
    #[arg(long, conflicts_with = "target_audio")]
    target_label: Option<Label>,

    /// Pull the features towards those of this recording
    #[arg(long)]
    target_audio: Option<PathBuf>,

    /// Label to evade (default: the model's prediction on the input)
    #[arg(long)]
    label: Option<Label>,

    /// Do not clamp the perturbation to [-epsilon, epsilon]
    #[arg(long)]
    no_clamp: bool,

    /// Do not clamp output samples to [-1, 1]
    #[arg(long)]
    no_amplitude_clamp: bool,

    /// Momentum decay for the update rule
    #[arg(long, num_args = 0..=1, default_missing_value = "0.9")]
    momentum: Option<f32>,

    /// Write 16-bit PCM instead of 32-bit float
    #[arg(long)]
    pcm16: bool,
}

impl CloakArgs {
    fn config(&self) -> Result<CloakConfig> {
        let mut config = match &self.config {
            Some(path) => CloakConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => CloakConfig::default(),
        };

        if let Some(preset) = &self.preset {
            config.optimizer = match preset.as_str() {
                "default" => OptimizerConfig::default(),
                "fast" => OptimizerConfig::fast(),
                "thorough" => OptimizerConfig::thorough(),
                other => bail!("Unknown preset '{}' (expected default, fast or thorough)", other),
            };
        }

        let opt = &mut config.optimizer;
        if let Some(epsilon) = self.epsilon {
            opt.epsilon = epsilon;
        }
        if let Some(iterations) = self.iterations {
            opt.max_iterations = iterations;
        }
        if let Some(rate) = self.learning_rate {
            opt.learning_rate = rate;
        }
        if let Some(beta) = self.beta {
            opt.beta = beta;
        }
        if let Some(tolerance) = self.tolerance {
            opt.convergence_tolerance = tolerance;
        }
        if let Some(decay) = self.momentum {
            opt.update_rule = UpdateRule::Momentum { decay };
        }
        if self.no_clamp {
            opt.clamp_perturbation = false;
        }

        if let Some(label) = self.target_label {
            config.target = AttackTarget::Label(label);
        }
        if let Some(path) = &self.target_audio {
            config.target = AttackTarget::Audio(path.clone());
        }
        if let Some(label) = self.label {
            config.original_label = Some(label);
        }
        if self.no_amplitude_clamp {
            config.amplitude_clamp = AmplitudeClamp::Off;
        }

        config.validate().context("Invalid cloaking configuration")?;
        Ok(config)
    }

    fn encoding(&self) -> WavEncoding {
        if self.pcm16 {
            WavEncoding::Pcm16
        } else {
            WavEncoding::Float32
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Cloak {
            input,
            model,
            cloak,
            output,
            report,
            format,
        } => run_cloak(&input, &model, &cloak, output, report, format),
        Commands::Evaluate {
            original,
            cloaked,
            model,
            label,
            config,
            report,
            format,
        } => run_evaluate(&original, &cloaked, &model, label, config, report, format),
        Commands::Batch {
            inputs,
            model,
            cloak,
            out_dir,
            jobs,
            summary,
        } => run_batch(&inputs, &model, &cloak, &out_dir, jobs, summary),
        Commands::Features { input, config } => run_features(&input, config),
        Commands::Models { models_dir } => run_models(&models_dir),
    }
}

fn run_cloak(
    input: &Path,
    model_args: &ModelArgs,
    args: &CloakArgs,
    output: Option<PathBuf>,
    report_path: Option<PathBuf>,
    format: ReportFormat,
) -> Result<()> {
    let config = args.config()?;
    let model = model_args.load()?;
    let cloaker = Cloaker::new(model, config)?;

    let outcome = cloaker
        .cloak_file(input)
        .with_context(|| format!("Failed to cloak {}", input.display()))?;

    let output = output.unwrap_or_else(|| default_output(input));
    write_wav(&output, &outcome.cloaked, args.encoding())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Wrote {}", output.display());

    let report = outcome.report(input.display().to_string());
    emit_report(&report, report_path, format)
}

fn run_evaluate(
    original: &Path,
    cloaked: &Path,
    model_args: &ModelArgs,
    label: Label,
    config_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
    format: ReportFormat,
) -> Result<()> {
    let config = load_config(config_path)?;
    let model = model_args.load()?;
    let loader = AudioLoader::new(config.loader.clone());
    let extractor = FeatureExtractor::new(config.features.clone())?;

    let original_wave = loader
        .load(original)
        .with_context(|| format!("Failed to load {}", original.display()))?;
    let cloaked_wave = loader
        .load(cloaked)
        .with_context(|| format!("Failed to load {}", cloaked.display()))?;

    let features = extractor.extract(&cloaked_wave)?;
    let evaluation = evaluate_cloak(std::slice::from_ref(&features), model.as_ref(), label)?;
    let distance = perceptual_distance(&original_wave, &cloaked_wave)
        .context("Original and cloaked audio are not comparable")?;
    let technical = conduct_technical_test(&original_wave, &cloaked_wave)?;

    let report = CloakReport::new(cloaked.display().to_string(), model.name(), label)
        .with_mode("evaluation")
        .with_evaluation(&evaluation)
        .with_perceptual_distance(distance)
        .with_technical(technical);
    emit_report(&report, report_path, format)
}

fn run_batch(
    inputs: &[PathBuf],
    model_args: &ModelArgs,
    args: &CloakArgs,
    out_dir: &Path,
    jobs: Option<usize>,
    summary: Option<PathBuf>,
) -> Result<()> {
    let config = args.config()?;
    let model = model_args.load()?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let batch = BatchCloaker::new(model, config)
        .with_max_parallel(jobs.unwrap_or_else(num_cpus::get))
        .with_encoding(args.encoding());
    let jobs: Vec<CloakJob> = inputs.iter().map(|p| CloakJob::into_dir(p, out_dir)).collect();

    let results = batch.process_all(&jobs);

    let mut failed = 0;
    for result in &results {
        match &result.error {
            None => println!(
                "{:<40} {:?}  success {:.2}  distance {:.4}  ({} iterations, {:.2?})",
                result.input_path.display(),
                result.status,
                result.success_rate,
                result.perceptual_distance,
                result.iterations,
                result.duration
            ),
            Some(error) => {
                failed += 1;
                println!("{:<40} {:?}  {}", result.input_path.display(), result.status, error);
            }
        }
    }

    if let Some(path) = summary {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if failed > 0 {
        bail!("{} of {} jobs failed", failed, results.len());
    }
    Ok(())
}

fn run_features(input: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let waveform = AudioLoader::new(config.loader.clone())
        .load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let features = FeatureExtractor::new(config.features)?.extract(&waveform)?;

    println!("{}", input.display());
    println!(
        "  audio:    {} samples, {} channel(s), {} Hz, {:.2} s",
        waveform.num_frames(),
        waveform.channels(),
        waveform.sample_rate(),
        waveform.duration_secs()
    );
    println!("  features: {:?}", features.shape());
    println!("  range:    {:.2} .. {:.2} dB", features.min(), features.max());
    Ok(())
}

fn run_models(models_dir: &Path) -> Result<()> {
    let names = ModelStore::new(models_dir).list()?;
    if names.is_empty() {
        println!("No models in {}", models_dir.display());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<CloakConfig> {
    match path {
        Some(path) => CloakConfig::from_json_file(&path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        None => Ok(CloakConfig::default()),
    }
}

fn emit_report(report: &CloakReport, path: Option<PathBuf>, format: ReportFormat) -> Result<()> {
    match path {
        Some(path) => {
            report
                .save(&path, format)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            log::info!("Report saved to {}", path.display());
        }
        None => print!("{}", report.generate(format)),
    }
    Ok(())
}

/// `voice.flac` → `voice.cloaked.wav` in the same directory
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    input.with_file_name(format!("{}.cloaked.wav", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn cloak_args(cli: Cli) -> CloakArgs {
        match cli.command {
            Commands::Cloak { cloak, .. } => cloak,
            _ => panic!("expected cloak command"),
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "audiocloak", "cloak", "in.wav", "--model", "m", "--epsilon", "0.1", "--iterations",
            "7", "--target-label", "2", "--no-amplitude-clamp", "--momentum",
        ]);
        let config = cloak_args(cli).config().unwrap();
        assert_eq!(config.optimizer.epsilon, 0.1);
        assert_eq!(config.optimizer.max_iterations, 7);
        assert_eq!(config.target, AttackTarget::Label(2));
        assert_eq!(config.amplitude_clamp, AmplitudeClamp::Off);
        assert_eq!(config.optimizer.update_rule, UpdateRule::Momentum { decay: 0.9 });
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloak.json");
        std::fs::write(&path, r#"{ "optimizer": { "epsilon": 0.2, "beta": 0.5 } }"#).unwrap();

        let cli = parse(&[
            "audiocloak", "cloak", "in.wav", "--model", "m", "--config",
            path.to_str().unwrap(), "--epsilon", "0.01",
        ]);
        let config = cloak_args(cli).config().unwrap();
        assert_eq!(config.optimizer.epsilon, 0.01);
        assert_eq!(config.optimizer.beta, 0.5);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = parse(&["audiocloak", "cloak", "in.wav", "--model", "m", "--learning-rate", "0"]);
        assert!(cloak_args(cli).config().is_err());
    }

    #[test]
    fn test_target_modes_conflict() {
        assert!(Cli::try_parse_from([
            "audiocloak", "cloak", "in.wav", "--model", "m", "--target-label", "1",
            "--target-audio", "t.wav",
        ])
        .is_err());
    }

    #[test]
    fn test_unknown_preset() {
        let cli = parse(&["audiocloak", "cloak", "in.wav", "--model", "m", "--preset", "slow"]);
        assert!(cloak_args(cli).config().is_err());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output(Path::new("/data/voice.flac")),
            PathBuf::from("/data/voice.cloaked.wav")
        );
    }
}
