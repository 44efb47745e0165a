//! HTTP transports behind the fetcher.

use super::options::{ClientOptions, RequestOptions};
use super::{FetchError, FetchResponse};
use crate::errors::{SwarmError, SwarmResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Method, Url};
use std::collections::BTreeMap;
use std::time::Duration;

/// Executes a single HTTP request.
///
/// Failures are returned as [`FetchError`] values; implementations must
/// not panic on network errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, request: &RequestOptions) -> Result<FetchResponse, FetchError>;
}

/// Flatten response headers by name; repeated headers (`Set-Cookie`, ...)
/// are joined with `, ` in arrival order. Non-UTF-8 values are skipped.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

/// Production transport backed by `reqwest`.
///
/// The underlying connection pool belongs to the runtime that first drives
/// it, so a transport should stay on the worker thread that built it.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    pub fn new(options: &ClientOptions) -> SwarmResult<Self> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("swarm/{}", env!("CARGO_PKG_VERSION")));

        let mut builder = reqwest::Client::builder().user_agent(user_agent);

        if options.verify == Some(false) {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if options.trust_env == Some(false) {
            builder = builder.no_proxy();
        }

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| SwarmError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        if options.http2 {
            builder = builder.http2_prior_knowledge();
        }

        if let Some(limits) = &options.limits {
            if let Some(idle) = limits.max_keepalive_connections.or(limits.max_connections) {
                builder = builder.pool_max_idle_per_host(idle);
            }
            if let Some(expiry) = limits
                .keepalive_expiry
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            {
                builder = builder.pool_idle_timeout(expiry);
            }
        }

        if let Some(timeout) = options.timeout() {
            builder = builder.timeout(timeout);
        }

        match options.follow_redirects {
            Some(false) => builder = builder.redirect(Policy::none()),
            Some(true) => builder = builder.redirect(Policy::limited(10)),
            None => {}
        }

        let base_url = options
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| SwarmError::Config(format!("invalid base_url '{}': {}", raw, e)))
            })
            .transpose()?;

        let client = builder
            .build()
            .map_err(|e| SwarmError::external("HTTP client", e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        if let Some(base) = &self.base_url {
            if !url.contains("://") {
                return base.join(url).map_err(|e| FetchError::invalid_url(url, e));
            }
        }
        Url::parse(url).map_err(|e| FetchError::invalid_url(url, e))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &str, request: &RequestOptions) -> Result<FetchResponse, FetchError> {
        let target = self.resolve(url)?;
        let method = request
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_uppercase()
            .parse::<Method>()
            .map_err(|e| FetchError::InvalidRequest(format!("invalid method: {}", e)))?;

        log::trace!("{} {}", method, target);

        let mut builder = self.client.request(method, target);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let query = request.query_pairs();
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        if let Some(cookies) = request.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookies);
        }

        if let Some(json) = &request.json {
            builder = builder.json(json);
        } else if let Some(form) = &request.data {
            builder = builder.form(form);
        } else if let Some(content) = &request.content {
            builder = builder.body(content.clone());
        }

        let response = builder.send().await.map_err(FetchError::from)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(FetchError::from)?;

        Ok(FetchResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}
