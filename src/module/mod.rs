//! Module Contract
//!
//! Every unit of work that produces results honors the same contract so the
//! dispatcher and the CLI can treat them uniformly:
//! - `buffer`: result accumulation with explicit clearing
//! - `http_probe`: built-in network module exercising fetcher and retry

mod buffer;
pub mod http_probe;

pub use buffer::{ModuleState, ResultBuffer, ResultValue};
pub use http_probe::HttpProbe;

use crate::config::ModuleOptions;
use crate::errors::{SwarmError, SwarmResult};
use std::backtrace::Backtrace;
use std::fmt;

/// A long-lived result-producing module.
///
/// Implementors own exactly one [`ResultBuffer`]. The contract operations
/// are provided on top of it.
pub trait Module: Send {
    /// Stable module name, also the section name in the config file
    fn name(&self) -> &'static str;

    fn buffer(&self) -> &ResultBuffer;

    fn options(&self) -> &ModuleOptions;

    /// Process one target, writing findings into the buffer
    fn run(&mut self, target: &str) -> SwarmResult<()>;

    fn set_result(&self, value: impl Into<ResultValue>)
    where
        Self: Sized,
    {
        self.buffer().set_result(value);
    }

    fn set_result_structured<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>)
    where
        Self: Sized,
        K: AsRef<str>,
        V: fmt::Display,
    {
        self.buffer().set_result_structured(entries);
    }

    fn get_result(&self, plain: bool) -> Vec<String> {
        self.buffer().get_result(plain)
    }

    fn clear(&self) {
        self.buffer().clear();
    }

    fn handle_error(&self, err: SwarmError, user_message: &str, raise_again: bool) -> SwarmResult<()> {
        report_error(self.name(), err, user_message, raise_again)
    }
}

/// Single error-reporting path for work units.
///
/// Logs the technical detail at debug level and `user_message` at error
/// level. Unexpected error kinds also get a backtrace. The error is handed
/// back only when `raise_again` is set.
pub fn report_error(
    origin: &str,
    err: SwarmError,
    user_message: &str,
    raise_again: bool,
) -> SwarmResult<()> {
    log::debug!("[{}] {}: {}", origin, err.kind(), err);
    log::error!("[{}] {}", origin, user_message);

    if !err.is_expected() {
        log::error!(
            "[{}] unexpected {} error\n{}",
            origin,
            err.kind(),
            Backtrace::force_capture()
        );
    }

    if raise_again {
        Err(err)
    } else {
        Ok(())
    }
}
