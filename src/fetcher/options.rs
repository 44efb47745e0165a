//! Fetch option parsing.
//!
//! Raw option maps are split by two fixed allow-lists. Keys outside both
//! lists (and outside `max_concurrent`) are dropped.

use crate::config::ModuleOptions;
use crate::errors::{SwarmError, SwarmResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Keys configuring the HTTP client itself
pub const CLIENT_KEYS: &[&str] = &[
    "verify",
    "proxy",
    "http2",
    "limits",
    "timeout",
    "base_url",
    "follow_redirects",
    "user_agent",
    "trust_env",
];

/// Keys configuring each individual request
pub const REQUEST_KEYS: &[&str] = &[
    "method", "headers", "params", "cookies", "data", "json", "content",
];

pub const MAX_CONCURRENT_KEY: &str = "max_concurrent";
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionLimits {
    pub max_connections: Option<usize>,
    pub max_keepalive_connections: Option<usize>,
    /// Seconds an idle pooled connection is kept
    pub keepalive_expiry: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// TLS certificate verification; `false` accepts invalid certificates
    pub verify: Option<bool>,
    pub proxy: Option<String>,
    pub http2: bool,
    pub limits: Option<ConnectionLimits>,
    /// Request timeout in seconds
    pub timeout: Option<f64>,
    pub base_url: Option<String>,
    pub follow_redirects: Option<bool>,
    pub user_agent: Option<String>,
    /// Honor proxy environment variables; `false` ignores them
    pub trust_env: Option<bool>,
}

impl ClientOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, Value>,
    pub cookies: BTreeMap<String, String>,
    /// Form fields, sent url-encoded
    pub data: Option<BTreeMap<String, String>>,
    pub json: Option<Value>,
    /// Raw body
    pub content: Option<String>,
}

impl RequestOptions {
    /// Query parameters with non-string values rendered as JSON scalars
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Options for one `fetch_all` call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub client: ClientOptions,
    pub request: RequestOptions,
    pub max_concurrent: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            client: ClientOptions::default(),
            request: RequestOptions::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl FetchOptions {
    pub fn from_map(raw: &Map<String, Value>) -> SwarmResult<Self> {
        let mut client = Map::new();
        let mut request = Map::new();
        let mut max_concurrent = DEFAULT_MAX_CONCURRENT;

        for (key, value) in raw {
            if CLIENT_KEYS.contains(&key.as_str()) {
                client.insert(key.clone(), value.clone());
            } else if REQUEST_KEYS.contains(&key.as_str()) {
                request.insert(key.clone(), value.clone());
            } else if key == MAX_CONCURRENT_KEY {
                max_concurrent = value
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| {
                        SwarmError::Config(format!("{} must be a positive integer", MAX_CONCURRENT_KEY))
                    })?;
            } else {
                log::debug!("Dropping unsupported fetch option '{}'", key);
            }
        }

        if max_concurrent == 0 {
            return Err(SwarmError::Config(format!(
                "{} must be a positive integer",
                MAX_CONCURRENT_KEY
            )));
        }

        let client: ClientOptions = serde_json::from_value(Value::Object(client))
            .map_err(|e| SwarmError::Config(format!("invalid client option: {}", e)))?;
        let request: RequestOptions = serde_json::from_value(Value::Object(request))
            .map_err(|e| SwarmError::Config(format!("invalid request option: {}", e)))?;

        Ok(Self {
            client,
            request,
            max_concurrent,
        })
    }

    /// Fetch options carried in a module's option map (`proxy`, `timeout`, ...)
    pub fn from_module_options(options: &ModuleOptions) -> SwarmResult<Self> {
        Self::from_map(options.as_map())
    }
}
