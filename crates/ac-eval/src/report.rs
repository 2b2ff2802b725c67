//! Report generation for cloaking runs

use std::io::Write;
use std::path::Path;

use ac_core::{Label, LossTerms};
use serde::{Deserialize, Serialize};

use crate::evaluate::Evaluation;
use crate::technical::TechnicalReport;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportFormat {
    /// Plain text report
    #[default]
    Text,
    /// JSON report
    Json,
    /// Markdown report
    Markdown,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Summary of one cloaking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloakReport {
    pub title: String,

    /// UTC, ISO 8601
    pub timestamp: String,

    pub input: String,
    pub model: String,

    /// Attack mode description
    pub mode: String,

    pub original_label: Label,

    /// Label predicted for the cloaked features
    pub predicted_label: Option<Label>,

    /// "converged" or "exhausted"
    pub termination: String,
    pub iterations: usize,

    pub success_rate: f64,
    pub perceptual_distance: f64,

    /// Losses at the final perturbation
    pub final_loss: Option<LossTerms>,

    /// Scores for the cloaked features
    pub model_output: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalReport>,
}

impl CloakReport {
    pub fn new(input: impl Into<String>, model: impl Into<String>, original_label: Label) -> Self {
        let input = input.into();
        Self {
            title: format!("Cloak report: {}", input),
            timestamp: utc_timestamp(),
            input,
            model: model.into(),
            mode: "untargeted".into(),
            original_label,
            predicted_label: None,
            termination: String::new(),
            iterations: 0,
            success_rate: 0.0,
            perceptual_distance: 0.0,
            final_loss: None,
            model_output: Vec::new(),
            technical: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_optimization(mut self, termination: impl Into<String>, iterations: usize) -> Self {
        self.termination = termination.into();
        self.iterations = iterations;
        self
    }

    /// Take success rate, prediction and scores from the first sample
    pub fn with_evaluation(mut self, evaluation: &Evaluation) -> Self {
        self.success_rate = evaluation.success_rate;
        self.predicted_label = evaluation.predicted_labels.first().copied();
        self.model_output = evaluation.model_output.first().cloned().unwrap_or_default();
        self
    }

    pub fn with_perceptual_distance(mut self, distance: f64) -> Self {
        self.perceptual_distance = distance;
        self
    }

    pub fn with_final_loss(mut self, loss: LossTerms) -> Self {
        self.final_loss = Some(loss);
        self
    }

    pub fn with_technical(mut self, technical: TechnicalReport) -> Self {
        self.technical = Some(technical);
        self
    }

    /// Whether the cloaked features evade the original label
    pub fn evaded(&self) -> bool {
        self.predicted_label.is_some_and(|l| l != self.original_label)
    }

    /// Generate report in specified format
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => self.to_text(),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Markdown => self.to_markdown(),
        }
    }

    /// Save report to file
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ReportFormat) -> std::io::Result<()> {
        let content = self.generate(format);
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())
    }

    fn label_text(&self) -> String {
        self.predicted_label
            .map_or_else(|| "-".to_string(), |l| l.to_string())
    }

    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n", self.title));
        output.push_str(&format!("{}\n\n", "=".repeat(self.title.len())));

        output.push_str(&format!("Timestamp: {}\n", self.timestamp));
        output.push_str(&format!("Model: {} | Mode: {}\n", self.model, self.mode));
        output.push_str(&format!(
            "Optimization: {} after {} iterations\n\n",
            self.termination, self.iterations
        ));

        let status = if self.evaded() { "EVADED" } else { "DETECTED" };
        output.push_str(&format!(
            "[{}] original label {} -> predicted {}\n",
            status,
            self.original_label,
            self.label_text()
        ));
        output.push_str(&format!("Success rate: {:.1}%\n", self.success_rate * 100.0));
        output.push_str(&format!("Perceptual distance: {:.6}\n", self.perceptual_distance));

        if let Some(loss) = &self.final_loss {
            output.push_str(&format!(
                "Final loss: total {:.6} (adversarial {:.6}, perceptual {:.6})\n",
                loss.total, loss.adversarial, loss.perceptual
            ));
        }

        if let Some(technical) = &self.technical {
            output.push('\n');
            output.push_str("Technical measurements:\n");
            output.push_str(&"-".repeat(40));
            output.push('\n');
            for (name, value) in &technical.measurements {
                output.push_str(&format!("  {}: {:.6}\n", name, value));
            }
        }

        output
    }

    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }

    fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", self.title));
        output.push_str(&format!("**Timestamp:** {}\n\n", self.timestamp));

        let status = if self.evaded() { "✅ evaded" } else { "❌ detected" };
        output.push_str(&format!("## Result: {}\n\n", status));
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Model | `{}` |\n", self.model));
        output.push_str(&format!("| Mode | {} |\n", self.mode));
        output.push_str(&format!("| Original label | {} |\n", self.original_label));
        output.push_str(&format!("| Predicted label | {} |\n", self.label_text()));
        output.push_str(&format!("| Termination | {} |\n", self.termination));
        output.push_str(&format!("| Iterations | {} |\n", self.iterations));
        output.push_str(&format!("| Success rate | {:.1}% |\n", self.success_rate * 100.0));
        output.push_str(&format!(
            "| Perceptual distance | {:.6} |\n",
            self.perceptual_distance
        ));
        if let Some(loss) = &self.final_loss {
            output.push_str(&format!("| Final loss | {:.6} |\n", loss.total));
        }
        output.push('\n');

        if let Some(technical) = &self.technical {
            output.push_str("## Technical measurements\n\n");
            output.push_str("| Measurement | Value |\n");
            output.push_str("|-------------|-------|\n");
            for (name, value) in &technical.measurements {
                output.push_str(&format!("| {} | {:.6} |\n", name, value));
            }
            output.push('\n');
        }

        output
    }
}

/// ISO 8601 UTC timestamp from the system clock
fn utc_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let (days, rem) = (secs.div_euclid(86_400), secs.rem_euclid(86_400));
    let (year, month, day) = civil_from_days(days);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 → (year, month, day), proleptic Gregorian
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> CloakReport {
        let evaluation = Evaluation {
            success_rate: 1.0,
            model_output: vec![vec![0.7, 0.3]],
            predicted_labels: vec![0],
        };
        let mut technical = TechnicalReport::default();
        technical.insert(TechnicalReport::SPECTRAL_SIMILARITY, 0.125);

        CloakReport::new("speech.wav", "speaker-id", 1)
            .with_mode("untargeted")
            .with_optimization("converged", 12)
            .with_evaluation(&evaluation)
            .with_perceptual_distance(0.42)
            .with_final_loss(LossTerms::new(0.3, 0.2, 1.0))
            .with_technical(technical)
    }

    #[test]
    fn test_report_fields() {
        let report = sample_report();
        assert!(report.evaded());
        assert_eq!(report.predicted_label, Some(0));
        assert_eq!(report.model_output, vec![0.7, 0.3]);
    }

    #[test]
    fn test_text_report() {
        let text = sample_report().generate(ReportFormat::Text);
        assert!(text.contains("Cloak report: speech.wav"));
        assert!(text.contains("EVADED"));
        assert!(text.contains("spectral_similarity"));
    }

    #[test]
    fn test_json_report() {
        let json = sample_report().generate(ReportFormat::Json);
        let parsed: CloakReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.iterations, 12);
        assert_eq!(parsed.termination, "converged");
    }

    #[test]
    fn test_markdown_report() {
        let md = sample_report().generate(ReportFormat::Markdown);
        assert!(md.contains("# Cloak report"));
        assert!(md.contains("| Metric |"));
        assert!(md.contains("## Technical measurements"));
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        sample_report().save(&path, ReportFormat::Markdown).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("# Cloak report"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert!("xml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
    }
}
