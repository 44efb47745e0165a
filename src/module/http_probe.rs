use super::{Module, ResultBuffer};
use crate::config::ModuleOptions;
use crate::errors::{SwarmError, SwarmResult};
use crate::fetcher::{AsyncFetcher, FetchOptions, FetchResponse};
use crate::retry::{RetryOutcome, RetryOverrides, RetryPolicy};
use regex::Regex;
use std::sync::Arc;

pub const NAME: &str = "http-probe";

/// Fetches a target over HTTP and records status, size and page title
pub struct HttpProbe {
    options: Arc<ModuleOptions>,
    overrides: RetryOverrides,
    buffer: ResultBuffer,
    title_re: Option<Regex>,
}

impl HttpProbe {
    pub fn new(options: Arc<ModuleOptions>, overrides: RetryOverrides) -> Self {
        let title_re = match Regex::new(r"(?is)<title[^>]*>(.*?)</title>") {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Failed to compile title pattern: {}", e);
                None
            }
        };

        Self {
            options,
            overrides,
            buffer: ResultBuffer::new(NAME),
            title_re,
        }
    }

    fn title(&self, body: &str) -> Option<String> {
        let caps = self.title_re.as_ref()?.captures(body)?;
        let title = caps
            .get(1)?
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!title.is_empty()).then_some(title)
    }

    fn fetch(&self, fetcher: &AsyncFetcher, url: &str) -> SwarmResult<FetchResponse> {
        let urls = [url.to_string()];
        let response = fetcher
            .fetch_all_blocking(&urls)?
            .pop()
            .ok_or_else(|| SwarmError::request(url, "no response"))?
            .map_err(|e| e.into_swarm(url))?;

        if response.status >= 500 {
            return Err(SwarmError::request(
                url,
                format!("server error {}", response.status),
            ));
        }
        Ok(response)
    }
}

/// Prefix `http://` when the target has no scheme
fn normalize_url(target: &str) -> SwarmResult<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(SwarmError::Validation("empty URL".to_string()));
    }
    if target.contains("://") {
        Ok(target.to_string())
    } else {
        Ok(format!("http://{}", target))
    }
}

impl Module for HttpProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    fn options(&self) -> &ModuleOptions {
        &self.options
    }

    fn run(&mut self, target: &str) -> SwarmResult<()> {
        let url = normalize_url(target)?;
        let fetcher = AsyncFetcher::from_options(&FetchOptions::from_module_options(&self.options)?)?;
        let policy = RetryPolicy::resolve(Some(&self.options), &self.overrides);

        let outcome = policy
            .blocking(|| self.fetch(&fetcher, &url))
            .named(format!("{} {}", NAME, url))
            .with_sink(&self.buffer)
            .call();

        match outcome {
            RetryOutcome::Success(response) => {
                let mut entries = vec![
                    ("status", response.status.to_string()),
                    ("length", response.body.len().to_string()),
                ];
                if let Some(title) = self.title(&response.body) {
                    entries.push(("title", title));
                }
                self.set_result_structured(entries);
                Ok(())
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(SwarmError::request(
                url,
                format!(
                    "gave up after {} attempt(s): {}",
                    attempts,
                    last_error.unwrap_or_else(|| "unknown error".to_string())
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, serve_http};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn probe(options: ModuleOptions) -> HttpProbe {
        let options = options
            .with("trust_env", false)
            .with("retry_delay", 0)
            .with("timeout", 5);
        HttpProbe::new(Arc::new(options), RetryOverrides::default())
    }

    #[test]
    fn test_records_status_length_and_title() {
        let server = serve_http(|_| {
            (
                200,
                "<html><head><TITLE>\n  Example   Domain </TITLE></head></html>".to_string(),
            )
        });

        let mut module = probe(ModuleOptions::new());
        module.run(&server.url("/")).unwrap();

        assert_eq!(
            module.get_result(true),
            vec!["STATUS: 200", "LENGTH: 61", "TITLE: Example Domain"]
        );
    }

    #[test]
    fn test_scheme_added_when_missing() {
        let server = serve_http(|_| (404, "missing".to_string()));
        let mut module = probe(ModuleOptions::new());

        module.run(&server.addr.to_string()).unwrap();
        assert_eq!(module.get_result(true), vec!["STATUS: 404", "LENGTH: 7"]);
    }

    #[test]
    fn test_server_errors_retried_until_exhausted() {
        let server = serve_http(|_| (503, "busy".to_string()));
        let mut module = probe(ModuleOptions::new().with("retry", 2));

        let err = module.run(&server.url("/")).unwrap_err();
        assert!(matches!(err, SwarmError::Request { .. }));
        assert_eq!(server.hits(), 2);
        assert!(module.get_result(true).is_empty());
    }

    #[test]
    fn test_debug_reports_retries_into_buffer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let server = serve_http(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (500, "oops".to_string())
            } else {
                (200, "ok".to_string())
            }
        });

        let mut module = probe(ModuleOptions::new().with("debug", true));
        module.run(&server.url("/")).unwrap();

        let results = module.get_result(true);
        assert_eq!(results.len(), 3);
        assert!(results[0].contains("attempt 1/3 failed"));
        assert_eq!(&results[1..], ["STATUS: 200", "LENGTH: 2"]);
    }

    #[test]
    fn test_unreachable_host_is_request_error() {
        let mut module = probe(ModuleOptions::new().with("retry", 1));
        let err = module.run(&closed_port_url()).unwrap_err();
        assert!(matches!(err, SwarmError::Request { .. }));
    }

    #[test]
    fn test_blank_target_rejected() {
        let mut module = probe(ModuleOptions::new());
        assert!(matches!(module.run("  "), Err(SwarmError::Validation(_))));
    }
}
