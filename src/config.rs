//! Module configuration.
//!
//! Options live in a JSON file keyed by module name:
//!
//! ```json
//! {
//!     "http-probe": { "retry": 5, "retry_delay": 0.5, "proxy": "http://127.0.0.1:8080" },
//!     "command":    { "debug": true }
//! }
//! ```
//!
//! Options are loaded once before a batch starts and shared read-only
//! (behind an `Arc`) by every worker afterwards.

use crate::errors::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Key/value options attached to one module instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleOptions {
    values: Map<String, Value>,
}

impl ModuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`ModuleOptions::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of attempts (`retry`)
    pub fn retry(&self) -> Option<u32> {
        self.get("retry")
            .and_then(value_as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
    }

    /// Delay between attempts (`retry_delay`, in seconds)
    pub fn retry_delay(&self) -> Option<Duration> {
        self.get("retry_delay")
            .and_then(value_as_f64)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn debug(&self) -> Option<bool> {
        match self.get("debug")? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Some(true),
                "false" | "no" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn proxy(&self) -> Option<&str> {
        self.get("proxy")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
    }
}

// Config files written by hand often quote numbers.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parsed configuration file: one [`ModuleOptions`] per module name
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SwarmConfig {
    modules: HashMap<String, ModuleOptions>,
}

impl SwarmConfig {
    /// Load a configuration file from disk
    pub fn load(path: &Path) -> SwarmResult<Self> {
        log::debug!("Loading module configuration from {:?}", path);
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SwarmError::io(e, Some(path.to_path_buf())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> SwarmResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(SwarmError::Config(
                "configuration root must be an object keyed by module name".to_string(),
            ));
        }
        let config: SwarmConfig = serde_json::from_value(value)?;
        log::debug!("Loaded options for {} module(s)", config.modules.len());
        Ok(config)
    }

    /// Options for the named module (empty when the file has no section for it)
    pub fn module(&self, name: &str) -> ModuleOptions {
        self.modules.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_typed_accessors() {
        let opts = ModuleOptions::new()
            .with("retry", 5)
            .with("retry_delay", 0.25)
            .with("debug", true)
            .with("proxy", "http://127.0.0.1:8080");

        assert_eq!(opts.retry(), Some(5));
        assert_eq!(opts.retry_delay(), Some(Duration::from_millis(250)));
        assert_eq!(opts.debug(), Some(true));
        assert_eq!(opts.proxy(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_quoted_values() {
        let opts = ModuleOptions::new()
            .with("retry", "2")
            .with("retry_delay", "1.5")
            .with("debug", "yes");

        assert_eq!(opts.retry(), Some(2));
        assert_eq!(opts.retry_delay(), Some(Duration::from_millis(1500)));
        assert_eq!(opts.debug(), Some(true));
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let opts = ModuleOptions::new()
            .with("retry", -1)
            .with("retry_delay", "soon")
            .with("proxy", "  ");

        assert_eq!(opts.retry(), None);
        assert_eq!(opts.retry_delay(), None);
        assert_eq!(opts.proxy(), None);
        assert_eq!(opts.debug(), None);
    }

    #[test]
    fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{ "http-probe": {{ "retry": 4, "retry_delay": 0 }}, "command": {{ "debug": true }} }}"#
        )?;

        let config = SwarmConfig::load(file.path())?;
        assert_eq!(config.module("http-probe").retry(), Some(4));
        assert_eq!(config.module("http-probe").retry_delay(), Some(Duration::ZERO));
        assert_eq!(config.module("command").debug(), Some(true));
        assert!(config.module("missing").is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_non_object_root() {
        let err = SwarmConfig::parse("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
    }
}
