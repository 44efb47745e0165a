//! Work Units
//!
//! A work unit is what the dispatcher runs once per target:
//! - any `Fn(&str, &str, &A) -> SwarmResult<T>` closure
//! - `command`: shell command template expansion
//! - `module_unit`: a fresh [`crate::module::Module`] per target

mod command;
mod module_unit;

pub use command::{expand_template, shell_quote, CommandUnit, PLACEHOLDER};
pub use module_unit::ModuleUnit;

use crate::errors::SwarmResult;

/// Caller-supplied function executed once per target.
///
/// `command` is the command or template for the batch. `aux` is the
/// caller's opaque argument object, forwarded unchanged.
pub trait WorkUnit<A>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn execute(&self, target: &str, command: &str, aux: &A) -> SwarmResult<Self::Output>;
}

impl<A, F, T> WorkUnit<A> for F
where
    F: Fn(&str, &str, &A) -> SwarmResult<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn execute(&self, target: &str, command: &str, aux: &A) -> SwarmResult<T> {
        self(target, command, aux)
    }
}
