//! Swarm
//!
//! Parallel fan-out engine for OSINT automation: one command or module
//! applied to every target, with bounded concurrency, retries and
//! per-target failure isolation.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod fetcher;
pub mod module;
pub mod retry;
pub mod ui;
pub mod work;

#[cfg(test)]
mod testing;

pub use config::{ModuleOptions, SwarmConfig};
pub use dispatcher::{BatchReport, DispatchConfig, TaskDispatcher};
pub use errors::{SwarmError, SwarmResult};
pub use fetcher::{fetch_all, AsyncFetcher, FetchOptions, FetchOutcome};
pub use module::{Module, ResultBuffer};
pub use retry::{RetryOutcome, RetryPolicy};
pub use work::WorkUnit;
