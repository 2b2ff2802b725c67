//! Batch cloaking jobs

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ac_audio::{write_wav, WavEncoding};
use ac_core::{CloakError, Label};
use ac_eval::{CloakReport, ReportFormat};
use ac_model::{Model, SharedModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CloakConfig;
use crate::optimizer::CancelFlag;
use crate::pipeline::Cloaker;

/// Unique job identifier
pub type JobId = u64;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One input file to cloak
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloakJob {
    pub id: JobId,
    pub input_path: PathBuf,

    /// Cloaked WAV destination
    pub output_path: PathBuf,

    /// Report destination, written alongside the audio
    pub report_path: Option<PathBuf>,
}

impl CloakJob {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            id: JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            input_path: input.into(),
            output_path: output.into(),
            report_path: None,
        }
    }

    pub fn with_report<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Job writing `<stem>.cloaked.wav` (and its JSON report) into `out_dir`
    pub fn into_dir<P: AsRef<Path>>(input: P, out_dir: &Path) -> Self {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        Self::new(input, out_dir.join(format!("{}.cloaked.wav", stem)))
            .with_report(out_dir.join(format!("{}.report.json", stem)))
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Job completion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub input_path: PathBuf,

    /// Output file path (if successful)
    pub output_path: Option<PathBuf>,
    pub duration: Duration,

    pub original_label: Option<Label>,
    pub predicted_label: Option<Label>,
    pub success_rate: f64,
    pub perceptual_distance: f64,
    pub iterations: usize,

    /// Error message (if failed)
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &CloakJob, report: &CloakReport, duration: Duration) -> Self {
        Self {
            job_id: job.id,
            status: JobStatus::Completed,
            input_path: job.input_path.clone(),
            output_path: Some(job.output_path.clone()),
            duration,
            original_label: Some(report.original_label),
            predicted_label: report.predicted_label,
            success_rate: report.success_rate,
            perceptual_distance: report.perceptual_distance,
            iterations: report.iterations,
            error: None,
        }
    }

    pub fn failure(job: &CloakJob, error: String, duration: Duration) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error),
            ..Self::empty(job, duration)
        }
    }

    pub fn cancelled(job: &CloakJob, iterations: usize, duration: Duration) -> Self {
        Self {
            status: JobStatus::Cancelled,
            iterations,
            ..Self::empty(job, duration)
        }
    }

    fn empty(job: &CloakJob, duration: Duration) -> Self {
        Self {
            job_id: job.id,
            status: JobStatus::Failed,
            input_path: job.input_path.clone(),
            output_path: None,
            duration,
            original_label: None,
            predicted_label: None,
            success_rate: 0.0,
            perceptual_distance: 0.0,
            iterations: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Runs independent cloaking jobs on a rayon pool
///
/// The model is shared read-only; every job owns its perturbation state.
pub struct BatchCloaker {
    model: SharedModel,
    config: CloakConfig,
    max_parallel: usize,
    encoding: WavEncoding,
    cancel: CancelFlag,
}

impl BatchCloaker {
    pub fn new(model: SharedModel, config: CloakConfig) -> Self {
        Self {
            model,
            config,
            max_parallel: rayon::current_num_threads(),
            encoding: WavEncoding::Float32,
            cancel: CancelFlag::new(),
        }
    }

    /// Set max parallel jobs
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    pub fn with_encoding(mut self, encoding: WavEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Flag shared by every job; cancelling stops all in-flight optimizations
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process all jobs in parallel, results in job order
    pub fn process_all(&self, jobs: &[CloakJob]) -> Vec<JobResult> {
        log::info!(
            "Cloaking {} file(s) with '{}' on {} thread(s)",
            jobs.len(),
            self.model.name(),
            self.max_parallel
        );

        let run = || -> Vec<JobResult> { jobs.par_iter().map(|job| self.process_job(job)).collect() };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                log::warn!("Falling back to the global rayon pool: {}", e);
                run()
            }
        }
    }

    pub fn process_job(&self, job: &CloakJob) -> JobResult {
        let start = Instant::now();

        let cloaker = match Cloaker::new(self.model.clone(), self.config.clone()) {
            Ok(c) => c.with_cancel_flag(self.cancel.clone()),
            Err(e) => return JobResult::failure(job, e.to_string(), start.elapsed()),
        };

        let outcome = match cloaker.cloak_file(&job.input_path) {
            Ok(outcome) => outcome,
            Err(CloakError::Cancelled { iterations }) => {
                log::info!("Job {} cancelled", job.id);
                return JobResult::cancelled(job, iterations, start.elapsed());
            }
            Err(e) => {
                log::warn!("Job {} ({}) failed: {}", job.id, job.input_path.display(), e);
                return JobResult::failure(job, e.to_string(), start.elapsed());
            }
        };

        if let Err(e) = write_wav(&job.output_path, &outcome.cloaked, self.encoding) {
            return JobResult::failure(job, e.to_string(), start.elapsed());
        }

        let report = outcome.report(job.input_path.display().to_string());
        if let Some(path) = &job.report_path {
            if let Err(e) = report.save(path, ReportFormat::Json) {
                if let Err(remove) = std::fs::remove_file(&job.output_path) {
                    log::warn!(
                        "Job {}: could not remove {}: {}",
                        job.id,
                        job.output_path.display(),
                        remove
                    );
                }
                return JobResult::failure(job, format!("report: {}", e), start.elapsed());
            }
        }

        JobResult::success(job, &report, start.elapsed())
    }
}
