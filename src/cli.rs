use crate::dispatcher::DispatchConfig;
use crate::errors::{SwarmError, SwarmResult};
use crate::retry::RetryOverrides;
use clap::{Parser, ValueEnum};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "swarm",
    about = "Swarm - run a command or module against every target line in parallel",
    version
)]
pub struct Args {
    /// Command template; `{}` is replaced with the quoted target
    #[arg(required_unless_present = "module", conflicts_with = "module")]
    pub command: Option<String>,

    /// Built-in module to run instead of a command
    #[arg(short, long)]
    pub module: Option<ModuleKind>,

    /// File with one target per line (stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short, long, default_value = "0")]
    pub threads: usize,

    /// Seconds to wait after submitting all targets
    #[arg(long)]
    pub delay: Option<f64>,

    /// Seconds before the whole batch is abandoned
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Seconds a single target may run before it counts as failed
    #[arg(long)]
    pub task_timeout: Option<f64>,

    /// Attempts per target for retrying modules (overrides the config file)
    #[arg(long)]
    pub retry: Option<u32>,

    /// Seconds between retry attempts (overrides the config file)
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// JSON file with options keyed by module name
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Strip terminal styling from results
    #[arg(long)]
    pub plain: bool,

    /// Abort on the first failing target and print results in input order
    #[arg(long)]
    pub fail_fast: bool,

    /// Enable verbose logging of all operations
    #[arg(short, long)]
    pub verbose: bool,

    /// Hide progress bars and use quiet output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ModuleKind {
    /// Fetch each target over HTTP and record status, length and title
    HttpProbe,
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleKind::HttpProbe => write!(f, "http-probe"),
        }
    }
}

impl Args {
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn dispatch_config(&self) -> SwarmResult<DispatchConfig> {
        Ok(DispatchConfig {
            max_workers: self.thread_count(),
            submit_delay: secs("--delay", self.delay)?,
            batch_timeout: secs("--timeout", self.timeout)?,
            task_timeout: secs("--task-timeout", self.task_timeout)?,
        })
    }

    pub fn retry_overrides(&self) -> SwarmResult<RetryOverrides> {
        if self.retry == Some(0) {
            return Err(SwarmError::Config("--retry must be at least 1".to_string()));
        }
        Ok(RetryOverrides {
            attempts: self.retry,
            delay: secs("--retry-delay", self.retry_delay)?,
            debug: None,
        })
    }
}

/// Seconds flag to duration; negative or non-finite values are rejected
fn secs(flag: &str, value: Option<f64>) -> SwarmResult<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                SwarmError::Config(format!("{} must be a non-negative number of seconds", flag))
            })
        })
        .transpose()
}

/// Read targets from `input`, or stdin when absent.
///
/// Lines are returned trimmed and in order. Blank lines are kept so the
/// dispatcher can report how many it skipped.
pub fn read_targets(input: Option<&Path>) -> SwarmResult<Vec<String>> {
    match input {
        Some(path) => {
            let file =
                std::fs::File::open(path).map_err(|e| SwarmError::io(e, Some(path.to_path_buf())))?;
            collect_lines(BufReader::new(file))
        }
        None => collect_lines(std::io::stdin().lock()),
    }
}

fn collect_lines<R: BufRead>(reader: R) -> SwarmResult<Vec<String>> {
    reader
        .lines()
        .map(|line| {
            line.map(|l| l.trim().to_string())
                .map_err(SwarmError::from)
        })
        .collect()
}
