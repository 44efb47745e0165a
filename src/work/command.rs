use super::WorkUnit;
use crate::errors::{SwarmError, SwarmResult};
use std::process::Command;

/// Placeholder replaced with the (quoted) target in command templates
pub const PLACEHOLDER: &str = "{}";

/// Quote `value` for safe interpolation into a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Substitute the target into a template.
///
/// Templates without a placeholder get the target appended as the last
/// argument.
pub fn expand_template(template: &str, target: &str) -> String {
    let quoted = shell_quote(target);
    if template.contains(PLACEHOLDER) {
        template.replace(PLACEHOLDER, &quoted)
    } else {
        format!("{} {}", template.trim_end(), quoted)
    }
}

/// Runs the batch command template through the shell for each target
#[derive(Debug, Clone)]
pub struct CommandUnit {
    shell: String,
}

impl CommandUnit {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl Default for CommandUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> WorkUnit<A> for CommandUnit {
    type Output = Vec<String>;

    fn execute(&self, target: &str, command: &str, _aux: &A) -> SwarmResult<Vec<String>> {
        if command.trim().is_empty() {
            return Err(SwarmError::Validation("empty command template".to_string()));
        }

        let line = expand_template(command, target);
        log::debug!("Running: {}", line);

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&line)
            .output()?;

        if !output.status.success() {
            return Err(SwarmError::Command {
                command: line,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
