use super::WorkUnit;
use crate::errors::SwarmResult;
use crate::module::Module;

/// Runs a freshly built module against each target.
///
/// A new instance per target keeps buffers from leaking between
/// concurrent workers.
pub struct ModuleUnit<F> {
    factory: F,
    plain: bool,
}

impl<F> ModuleUnit<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            plain: false,
        }
    }

    /// Strip terminal styling from the collected results
    pub fn plain(mut self, plain: bool) -> Self {
        self.plain = plain;
        self
    }
}

impl<A, F, M> WorkUnit<A> for ModuleUnit<F>
where
    F: Fn() -> M + Send + Sync + 'static,
    M: Module,
{
    type Output = Vec<String>;

    fn execute(&self, target: &str, _command: &str, _aux: &A) -> SwarmResult<Vec<String>> {
        let mut module = (self.factory)();
        module.clear();

        let outcome = module.run(target);
        module.buffer().finish();

        // A module overriding `handle_error` may swallow the failure and
        // keep whatever it buffered
        match outcome {
            Ok(()) => Ok(module.get_result(self.plain)),
            Err(err) => {
                let message = format!("{} failed on {}", module.name(), target);
                module
                    .handle_error(err, &message, true)
                    .map(|()| module.get_result(self.plain))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleOptions;
    use crate::errors::SwarmError;
    use crate::module::ResultBuffer;

    struct Upper {
        options: ModuleOptions,
        buffer: ResultBuffer,
        lenient: bool,
    }

    impl Module for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn buffer(&self) -> &ResultBuffer {
            &self.buffer
        }

        fn options(&self) -> &ModuleOptions {
            &self.options
        }

        fn handle_error(&self, err: SwarmError, user_message: &str, raise_again: bool) -> SwarmResult<()> {
            crate::module::report_error(self.name(), err, user_message, raise_again && !self.lenient)
        }

        fn run(&mut self, target: &str) -> SwarmResult<()> {
            if let Some(rest) = target.strip_prefix('~') {
                self.set_result(rest.to_uppercase());
                return Err(SwarmError::request(rest, "partial lookup"));
            }
            if target.starts_with('!') {
                return Err(SwarmError::Validation(format!("rejected {}", target)));
            }
            self.set_result(target.to_uppercase());
            Ok(())
        }
    }

    fn unit_with(lenient: bool) -> ModuleUnit<impl Fn() -> Upper + Send + Sync + 'static> {
        ModuleUnit::new(move || Upper {
            options: ModuleOptions::new(),
            buffer: ResultBuffer::new("upper"),
            lenient,
        })
    }

    fn unit() -> ModuleUnit<impl Fn() -> Upper + Send + Sync + 'static> {
        unit_with(false)
    }

    #[test]
    fn test_module_results_per_target() {
        let unit = unit();
        assert_eq!(unit.execute("abc", "", &()).unwrap(), vec!["ABC"]);
        assert_eq!(unit.execute("xyz", "", &()).unwrap(), vec!["XYZ"]);
    }

    #[test]
    fn test_module_error_is_raised() {
        let unit = unit();
        let err = unit.execute("!bad", "", &()).unwrap_err();
        assert!(matches!(err, SwarmError::Validation(_)));
    }

    #[test]
    fn test_swallowed_error_keeps_partial_results() {
        let strict = unit();
        assert!(matches!(
            strict.execute("~half", "", &()),
            Err(SwarmError::Request { .. })
        ));

        let lenient = unit_with(true);
        assert_eq!(lenient.execute("~half", "", &()).unwrap(), vec!["HALF"]);
    }
}
