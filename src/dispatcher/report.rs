use chrono::{DateTime, Local};
use std::time::Duration;

/// Failed targets shown in log lines and the CLI summary
pub const FAILED_SAMPLE_SIZE: usize = 10;

/// One successful target with its work unit output
#[derive(Debug, Clone)]
pub struct TargetResult<T> {
    pub target: String,
    pub value: T,
    pub elapsed: Duration,
}

/// Outcome of one `run_batch` call.
///
/// `results` is in completion order. `failed` lists every target that
/// errored, panicked or timed out.
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub results: Vec<TargetResult<T>>,
    pub failed: Vec<String>,
    /// Blank input lines that were never scheduled
    pub skipped: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl<T> BatchReport<T> {
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.results.iter().map(|r| &r.value)
    }

    pub fn into_values(self) -> Vec<T> {
        self.results.into_iter().map(|r| r.value).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.failed.len()
    }

    pub fn failed_sample(&self, limit: usize) -> &[String] {
        &self.failed[..self.failed.len().min(limit)]
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Human-readable multi-line summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Batch started {} finished {} ({:.2}s)",
                self.started_at.format("%Y-%m-%d %H:%M:%S"),
                self.finished_at.format("%H:%M:%S"),
                self.duration().as_secs_f64()
            ),
            format!(
                "{} targets: {} succeeded, {} failed, {} skipped",
                self.total(),
                self.succeeded(),
                self.failed.len(),
                self.skipped
            ),
        ];

        if !self.failed.is_empty() {
            let sample = self.failed_sample(FAILED_SAMPLE_SIZE);
            let mut line = format!("Failed: {}", sample.join(", "));
            if self.failed.len() > sample.len() {
                line.push_str(&format!(" (+{} more)", self.failed.len() - sample.len()));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}
