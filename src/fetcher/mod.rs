//! Async Fetcher
//!
//! Issues a batch of HTTP requests concurrently under a counting-permit cap
//! and returns one [`FetchOutcome`] per URL, in input order. A failing URL
//! never aborts the rest of the batch.
//! - `options`: allow-list split of raw option maps
//! - `transport`: request execution (`reqwest` in production)
//! - `runtime`: per-worker runtime for calls from pool threads

mod options;
mod runtime;
mod transport;

pub use options::{
    ClientOptions, ConnectionLimits, FetchOptions, RequestOptions, CLIENT_KEYS,
    DEFAULT_MAX_CONCURRENT, MAX_CONCURRENT_KEY, REQUEST_KEYS,
};
pub use runtime::block_on_worker;
pub use transport::{ReqwestTransport, Transport};

use crate::errors::{SwarmError, SwarmResult};
use crate::retry::RetryValue;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Lower-cased names; repeated headers joined with `, `
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl RetryValue for FetchResponse {}

/// Per-URL failure captured by the fetcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    pub fn invalid_url(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Raise a captured failure as a work-unit error
    pub fn into_swarm(self, url: &str) -> SwarmError {
        match self {
            Self::InvalidUrl { url, reason } => {
                SwarmError::Validation(format!("invalid URL '{}': {}", url, reason))
            }
            other => SwarmError::request(url, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

pub type FetchOutcome = Result<FetchResponse, FetchError>;

/// Concurrency-capped batch fetcher
pub struct AsyncFetcher<T = ReqwestTransport> {
    transport: T,
    request: RequestOptions,
    permits: Semaphore,
    max_concurrent: usize,
}

impl AsyncFetcher<ReqwestTransport> {
    pub fn from_options(options: &FetchOptions) -> SwarmResult<Self> {
        let transport = ReqwestTransport::new(&options.client)?;
        Self::with_transport(transport, options.request.clone(), options.max_concurrent)
    }
}

impl<T: Transport> AsyncFetcher<T> {
    pub fn with_transport(
        transport: T,
        request: RequestOptions,
        max_concurrent: usize,
    ) -> SwarmResult<Self> {
        if max_concurrent == 0 {
            return Err(SwarmError::Config(
                "fetcher concurrency must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            transport,
            request,
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchOutcome> {
        self.fetch_all_cancellable(urls, &CancellationToken::new()).await
    }

    /// Like [`AsyncFetcher::fetch_all`], but returns an empty list when
    /// `cancel` fires before every request has finished.
    pub async fn fetch_all_cancellable(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Vec<FetchOutcome> {
        if urls.is_empty() {
            return Vec::new();
        }

        log::debug!(
            "Fetching {} URL(s) with at most {} in flight",
            urls.len(),
            self.max_concurrent
        );

        let requests = join_all(urls.iter().map(|url| self.fetch_one(url)));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Fetch of {} URL(s) cancelled, discarding partial results", urls.len());
                Vec::new()
            }
            outcomes = requests => outcomes,
        }
    }

    /// Run [`AsyncFetcher::fetch_all`] from a blocking worker thread
    pub fn fetch_all_blocking(&self, urls: &[String]) -> SwarmResult<Vec<FetchOutcome>> {
        block_on_worker(self.fetch_all(urls))
    }

    async fn fetch_one(&self, url: &str) -> FetchOutcome {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Task("request permits closed".to_string()))?;

        let outcome = self.transport.send(url, &self.request).await;
        match &outcome {
            Ok(response) => log::trace!("{} -> {}", url, response.status),
            Err(e) => log::debug!("{} failed: {}", url, e),
        }
        outcome
    }
}

/// One-shot batch fetch with the production transport
pub async fn fetch_all(urls: &[String], options: &FetchOptions) -> SwarmResult<Vec<FetchOutcome>> {
    let fetcher = AsyncFetcher::from_options(options)?;
    Ok(fetcher.fetch_all(urls).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, request_path, serve_http};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct MockTransport {
        latency: HashMap<String, Duration>,
        failing: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        completed: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn with_latency(mut self, url: &str, millis: u64) -> Self {
            self.latency.insert(url.to_string(), Duration::from_millis(millis));
            self
        }

        fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl Transport for Arc<MockTransport> {
        async fn send(&self, url: &str, _request: &RequestOptions) -> Result<FetchResponse, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let latency = self.latency.get(url).copied().unwrap_or(Duration::from_millis(5));
            tokio::time::sleep(latency).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.lock().push(url.to_string());

            if self.failing.contains(url) {
                return Err(FetchError::Connect(format!("{} refused", url)));
            }
            Ok(FetchResponse {
                url: url.to_string(),
                status: 200,
                headers: BTreeMap::new(),
                body: format!("body of {}", url),
            })
        }
    }

    fn local_options() -> FetchOptions {
        let mut options = FetchOptions::default();
        options.client.trust_env = Some(false);
        options
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_outcomes_follow_input_order() {
        let targets = urls(&["http://a", "http://b", "http://c", "http://d", "http://e"]);
        let mock = Arc::new(
            MockTransport::default()
                .with_latency("http://a", 80)
                .with_latency("http://b", 60)
                .with_latency("http://c", 40)
                .with_latency("http://d", 20)
                .with_latency("http://e", 1),
        );
        let fetcher = AsyncFetcher::with_transport(Arc::clone(&mock), RequestOptions::default(), 5).unwrap();

        let outcomes = fetcher.fetch_all(&targets).await;

        assert_eq!(outcomes.len(), targets.len());
        for (url, outcome) in targets.iter().zip(&outcomes) {
            assert_eq!(&outcome.as_ref().unwrap().url, url);
        }
        // Completion order was the reverse of submission order
        assert_eq!(mock.completed.lock().first().map(String::as_str), Some("http://e"));
    }

    #[tokio::test]
    async fn test_single_permit_serializes_requests() {
        let targets = urls(&["http://x", "http://y"]);
        let mock = Arc::new(
            MockTransport::default()
                .with_latency("http://x", 30)
                .with_latency("http://y", 30),
        );
        let fetcher = AsyncFetcher::with_transport(Arc::clone(&mock), RequestOptions::default(), 1).unwrap();

        let outcomes = fetcher.fetch_all(&targets).await;

        assert_eq!(mock.peak.load(Ordering::SeqCst), 1);
        assert!(outcomes.iter().all(|o| o.as_ref().map(|r| r.is_success()).unwrap_or(false)));
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_cap() {
        let targets: Vec<String> = (0..12).map(|i| format!("http://host-{}", i)).collect();
        let mut mock = MockTransport::default();
        for url in &targets {
            mock = mock.with_latency(url, 15);
        }
        let mock = Arc::new(mock);
        let fetcher = AsyncFetcher::with_transport(Arc::clone(&mock), RequestOptions::default(), 3).unwrap();

        let outcomes = fetcher.fetch_all(&targets).await;

        assert_eq!(outcomes.len(), 12);
        assert!(mock.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_failure_is_captured_per_url() {
        let targets = urls(&["http://ok-1", "http://down", "http://ok-2"]);
        let mock = Arc::new(MockTransport::default().failing("http://down"));
        let fetcher = AsyncFetcher::with_transport(mock, RequestOptions::default(), 2).unwrap();

        let outcomes = fetcher.fetch_all(&targets).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(FetchError::Connect(_))));
        assert!(outcomes[2].is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_returns_nothing() {
        let targets = urls(&["http://fast", "http://slow"]);
        let mock = Arc::new(
            MockTransport::default()
                .with_latency("http://fast", 1)
                .with_latency("http://slow", 500),
        );
        let fetcher = AsyncFetcher::with_transport(mock, RequestOptions::default(), 2).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcomes = fetcher.fetch_all_cancellable(&targets, &cancel).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fetcher =
            AsyncFetcher::with_transport(Arc::new(MockTransport::default()), RequestOptions::default(), 1)
                .unwrap();
        assert!(fetcher.fetch_all(&[]).await.is_empty());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result =
            AsyncFetcher::with_transport(Arc::new(MockTransport::default()), RequestOptions::default(), 0);
        assert!(matches!(result, Err(SwarmError::Config(_))));
    }

    #[test]
    fn test_blocking_fetch_from_worker_thread() {
        let mock = Arc::new(MockTransport::default());
        let fetcher = AsyncFetcher::with_transport(mock, RequestOptions::default(), 2).unwrap();
        let targets = urls(&["http://one", "http://two"]);

        let outcomes = std::thread::spawn(move || fetcher.fetch_all_blocking(&targets).unwrap())
            .join()
            .unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_reqwest_transport_against_local_server() {
        let server = serve_http(|head| match request_path(head) {
            "/missing" => (404, "not here".to_string()),
            _ => (200, "<title>ok</title>".to_string()),
        });
        let targets = vec![server.url("/"), server.url("/missing"), closed_port_url()];

        let outcomes = fetch_all(&targets, &local_options()).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        let first = outcomes[0].as_ref().unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.body, "<title>ok</title>");
        assert_eq!(outcomes[1].as_ref().unwrap().status, 404);
        assert!(matches!(outcomes[2], Err(FetchError::Connect(_))));
    }

    #[tokio::test]
    async fn test_request_options_reach_the_wire() {
        let server = serve_http(|head| (200, head.to_string()));
        let raw = serde_json::json!({
            "base_url": server.url("/"),
            "trust_env": false,
            "headers": { "X-Api-Key": "abc" },
            "params": { "q": "example.com" },
            "cookies": { "session": "s1" }
        });
        let options = match raw {
            serde_json::Value::Object(map) => FetchOptions::from_map(&map).unwrap(),
            _ => unreachable!(),
        };

        let outcomes = fetch_all(&urls(&["/echo"]), &options).await.unwrap();
        let echoed = outcomes[0].as_ref().unwrap().body.to_lowercase();

        assert!(echoed.starts_with("get /echo?q=example.com "));
        assert!(echoed.contains("x-api-key: abc"));
        assert!(echoed.contains("cookie: session=s1"));
    }

    #[tokio::test]
    async fn test_client_timeout_is_captured() {
        let server = serve_http(|_| {
            std::thread::sleep(Duration::from_millis(400));
            (200, "late".to_string())
        });
        let mut options = local_options();
        options.client.timeout = Some(0.05);

        let outcomes = fetch_all(&[server.url("/")], &options).await.unwrap();
        assert_eq!(outcomes[0], Err(FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_invalid_url_is_captured() {
        let outcomes = fetch_all(&urls(&["not a url"]), &local_options()).await.unwrap();
        assert!(matches!(outcomes[0], Err(FetchError::InvalidUrl { .. })));
    }
}
