use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Terminal progress for one batch run.
///
/// Cloning shares the underlying bar, so the dispatcher's collector and the
/// CLI can both hold one.
#[derive(Clone)]
pub struct BatchProgress {
    bar: ProgressBar,
    started: Instant,
}

impl BatchProgress {
    pub fn new(total: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };

        match ProgressStyle::with_template(
            "{prefix} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
        ) {
            Ok(bar_style) => bar.set_style(bar_style.progress_chars("█▉▊▋▌▍▎▏  ")),
            Err(e) => log::warn!("Invalid progress template: {}", e),
        }
        bar.set_prefix(style("SWARM").green().bold().to_string());

        Self {
            bar,
            started: Instant::now(),
        }
    }

    pub fn hidden() -> Self {
        Self::new(0, true)
    }

    pub fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    pub fn task_finished(&self, target: &str, ok: bool) {
        let label = if ok {
            style(target).white().to_string()
        } else {
            style(target).red().to_string()
        };
        self.bar.set_message(label);
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, failed: usize) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let message = if failed == 0 {
            style(format!("done in {:.1}s", elapsed)).green().bold().to_string()
        } else {
            style(format!("done in {:.1}s, {} failed", elapsed, failed))
                .yellow()
                .bold()
                .to_string()
        };
        self.bar.finish_with_message(message);
    }
}
