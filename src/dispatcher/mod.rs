//! Task Dispatcher Module
//!
//! Bounded fan-out of a work unit over a target list on a fixed-size rayon
//! pool:
//! - `run_batch`: completion-order collection, failures isolated per target
//! - `run_mapped`: positional over parallel lists, first error aborts
//! - `report`: batch outcome and summary

mod report;

pub use report::{BatchReport, TargetResult, FAILED_SAMPLE_SIZE};

use crate::errors::{SwarmError, SwarmResult};
use crate::ui::BatchProgress;
use crate::work::WorkUnit;
use chrono::Local;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pool configuration for one dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub max_workers: usize,
    /// Pause applied once after all tasks are submitted
    pub submit_delay: Option<Duration>,
    /// Deadline for the whole batch, measured from the first submission
    pub batch_timeout: Option<Duration>,
    /// Tasks running longer than this are reported failed
    pub task_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            submit_delay: None,
            batch_timeout: None,
            task_timeout: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Self::default()
        }
    }
}

struct Completion<T> {
    index: usize,
    outcome: SwarmResult<T>,
    elapsed: Duration,
}

/// Messages from pool workers to the batch collector
enum TaskEvent<T> {
    Started { index: usize, at: Instant },
    Finished(Completion<T>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Queued,
    Running(Instant),
    Done,
}

/// Completion-order bookkeeping for one `run_batch` call
struct Collector<'a, T> {
    dispatcher: &'a TaskDispatcher,
    active: &'a [String],
    slots: Vec<Slot>,
    remaining: usize,
    results: Vec<TargetResult<T>>,
    failed: Vec<String>,
}

impl<'a, T> Collector<'a, T> {
    fn new(dispatcher: &'a TaskDispatcher, active: &'a [String]) -> Self {
        Self {
            dispatcher,
            active,
            slots: vec![Slot::Queued; active.len()],
            remaining: active.len(),
            results: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn task_timeout(&self) -> Option<Duration> {
        self.dispatcher.config.task_timeout
    }

    fn handle(&mut self, event: TaskEvent<T>) {
        match event {
            TaskEvent::Started { index, at } => {
                if self.slots[index] == Slot::Queued {
                    self.slots[index] = Slot::Running(at);
                }
            }
            TaskEvent::Finished(completion) => self.finish(completion),
        }
    }

    fn finish(&mut self, completion: Completion<T>) {
        let target = &self.active[completion.index];
        if self.slots[completion.index] == Slot::Done {
            log::debug!(
                "Dropping late result for {} after {:?}",
                target,
                completion.elapsed
            );
            return;
        }
        self.slots[completion.index] = Slot::Done;
        self.remaining -= 1;

        let outcome = match self.task_timeout() {
            Some(limit) if completion.elapsed > limit => Err(SwarmError::timeout(
                format!("target {}", target),
                completion.elapsed,
            )),
            _ => completion.outcome,
        };

        match outcome {
            Ok(value) => {
                log::debug!("Completed {} in {:?}", target, completion.elapsed);
                self.dispatcher.advance(target, true);
                self.results.push(TargetResult {
                    target: target.clone(),
                    value,
                    elapsed: completion.elapsed,
                });
            }
            Err(e) => {
                log::warn!("Target {} failed: {}", target, e);
                self.fail(completion.index);
            }
        }
    }

    fn fail(&mut self, index: usize) {
        let target = &self.active[index];
        self.dispatcher.advance(target, false);
        self.failed.push(target.clone());
    }

    /// Fail every running task whose per-task deadline has passed
    fn expire_overdue(&mut self, now: Instant) {
        let Some(limit) = self.task_timeout() else { return };
        for index in 0..self.slots.len() {
            if let Slot::Running(at) = self.slots[index] {
                let elapsed = now.saturating_duration_since(at);
                if elapsed >= limit {
                    log::warn!(
                        "Target {} failed: {}",
                        self.active[index],
                        SwarmError::timeout(format!("target {}", self.active[index]), elapsed)
                    );
                    self.slots[index] = Slot::Done;
                    self.remaining -= 1;
                    self.fail(index);
                }
            }
        }
    }

    /// Earliest per-task deadline among running tasks
    fn next_expiry(&self) -> Option<Instant> {
        let limit = self.task_timeout()?;
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Running(at) => Some(*at + limit),
                _ => None,
            })
            .min()
    }

    /// Fail whatever is still queued or running when the batch deadline hits
    fn abandon_outstanding(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index] != Slot::Done {
                self.slots[index] = Slot::Done;
                self.remaining -= 1;
                self.fail(index);
            }
        }
    }
}

pub struct TaskDispatcher {
    config: DispatchConfig,
    pool: rayon::ThreadPool,
    progress: Option<BatchProgress>,
}

impl TaskDispatcher {
    pub fn new(config: DispatchConfig) -> SwarmResult<Self> {
        if config.max_workers == 0 {
            return Err(SwarmError::Config(
                "max_workers must be a positive integer".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|i| format!("swarm-worker-{}", i))
            .build()
            .map_err(|e| SwarmError::ThreadPool(e.to_string()))?;

        log::debug!("Dispatcher ready with {} workers", config.max_workers);

        Ok(Self {
            config,
            pool,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: BatchProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run `unit` once per non-blank target.
    ///
    /// A failing, panicking or overdue target lands in `failed` and never
    /// stops the rest. Only loss of the worker pool itself is an error.
    pub fn run_batch<W, A>(
        &self,
        unit: Arc<W>,
        command: &str,
        targets: &[String],
        aux: Arc<A>,
    ) -> SwarmResult<BatchReport<W::Output>>
    where
        W: WorkUnit<A>,
        A: Send + Sync + 'static,
    {
        let started_at = Local::now();
        let batch_start = Instant::now();

        let active: Vec<String> = targets
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        let skipped = targets.len() - active.len();
        if skipped > 0 {
            log::debug!("Skipping {} blank targets", skipped);
        }

        if let Some(progress) = &self.progress {
            progress.set_total(active.len() as u64);
        }

        log::info!(
            "Dispatching {} targets on {} workers",
            active.len(),
            self.config.max_workers
        );

        let command: Arc<str> = Arc::from(command);
        let (tx, rx) = mpsc::channel::<TaskEvent<W::Output>>();

        for (index, target) in active.iter().enumerate() {
            let tx = tx.clone();
            let unit = Arc::clone(&unit);
            let aux = Arc::clone(&aux);
            let command = Arc::clone(&command);
            let target = target.clone();

            self.pool.spawn(move || {
                let started = Instant::now();
                let _ = tx.send(TaskEvent::Started { index, at: started });
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    unit.execute(&target, &command, &aux)
                }))
                .unwrap_or_else(|payload| {
                    Err(SwarmError::Panicked {
                        target: target.clone(),
                        message: panic_message(payload.as_ref()),
                    })
                });
                let _ = tx.send(TaskEvent::Finished(Completion {
                    index,
                    outcome,
                    elapsed: started.elapsed(),
                }));
            });
        }
        drop(tx);

        if let Some(delay) = self.config.submit_delay {
            log::debug!("Waiting {:?} after submission", delay);
            std::thread::sleep(delay);
        }

        let deadline = self.config.batch_timeout.map(|t| batch_start + t);
        let mut collector = Collector::new(self, &active);
        let unreported = |remaining: usize| {
            SwarmError::Dispatch(format!(
                "workers stopped with {} targets unreported",
                remaining
            ))
        };

        while collector.remaining > 0 {
            // Apply everything already reported before judging deadlines
            loop {
                match rx.try_recv() {
                    Ok(event) => collector.handle(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if collector.remaining > 0 {
                            return Err(unreported(collector.remaining));
                        }
                        break;
                    }
                }
            }
            if collector.remaining == 0 {
                break;
            }

            let now = Instant::now();
            collector.expire_overdue(now);
            if collector.remaining == 0 {
                break;
            }
            if deadline.is_some_and(|deadline| now >= deadline) {
                log::warn!(
                    "Batch deadline reached with {} targets outstanding",
                    collector.remaining
                );
                collector.abandon_outstanding();
                break;
            }

            let wake = match (deadline, collector.next_expiry()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let received = match wake {
                Some(wake) => rx.recv_timeout(wake.saturating_duration_since(now)),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => collector.handle(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(unreported(collector.remaining));
                }
            }
        }

        let Collector {
            results, failed, ..
        } = collector;

        if !failed.is_empty() {
            let sample = &failed[..failed.len().min(FAILED_SAMPLE_SIZE)];
            log::warn!("{} targets failed: {}", failed.len(), sample.join(", "));
        }

        if let Some(progress) = &self.progress {
            progress.finish(failed.len());
        }

        Ok(BatchReport {
            results,
            failed,
            skipped,
            started_at,
            finished_at: Local::now(),
        })
    }

    /// Positional execution over parallel `targets`, `commands` and `aux`.
    ///
    /// Output order matches input order. On failure the error (or panic) at
    /// the lowest failing position is returned, and positions after it that
    /// have not started yet are skipped.
    pub fn run_mapped<W, A>(
        &self,
        unit: &W,
        targets: &[String],
        commands: &[String],
        aux: &[A],
    ) -> SwarmResult<Vec<W::Output>>
    where
        W: WorkUnit<A>,
        A: Sync,
    {
        if targets.len() != commands.len() || targets.len() != aux.len() {
            return Err(SwarmError::Validation(format!(
                "mapped lists differ in length: {} targets, {} commands, {} aux",
                targets.len(),
                commands.len(),
                aux.len()
            )));
        }

        log::info!(
            "Mapping {} targets on {} workers",
            targets.len(),
            self.config.max_workers
        );

        // Lowest failing index seen so far; later positions are skipped
        let first_error: Mutex<Option<(usize, SwarmError)>> = Mutex::new(None);

        let outputs: Vec<Option<W::Output>> = self.pool.install(|| {
            targets
                .par_iter()
                .zip(commands.par_iter())
                .zip(aux.par_iter())
                .enumerate()
                .map(|(index, ((target, command), aux))| {
                    if matches!(&*first_error.lock(), Some((failed_at, _)) if *failed_at < index) {
                        return None;
                    }

                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| unit.execute(target, command, aux)))
                            .unwrap_or_else(|payload| {
                                Err(SwarmError::Panicked {
                                    target: target.clone(),
                                    message: panic_message(payload.as_ref()),
                                })
                            });

                    match outcome {
                        Ok(value) => Some(value),
                        Err(err) => {
                            let mut slot = first_error.lock();
                            if slot.as_ref().map_or(true, |(failed_at, _)| index < *failed_at) {
                                *slot = Some((index, err));
                            }
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some((index, err)) = first_error.into_inner() {
            log::warn!("Mapped batch aborted at {}: {}", targets[index], err);
            return Err(err);
        }
        Ok(outputs.into_iter().flatten().collect())
    }

    fn advance(&self, target: &str, ok: bool) {
        if let Some(progress) = &self.progress {
            progress.task_finished(target, ok);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
