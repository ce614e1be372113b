use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, RETRY_AFTER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Browser user agents rotated across requests to reduce blocking.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("client error: HTTP {status}")]
    ClientError { status: u16 },

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("timed out after {attempts} attempts: {detail}")]
    Timeout { attempts: u32, detail: String },

    #[error("network error after {attempts} attempts: {detail}")]
    Network { attempts: u32, detail: String },
}

/// Backoff schedule for retryable failures: the base delay doubles on each
/// attempt and is stretched by a random jitter factor so retries across
/// products do not synchronize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms.saturating_mul(1u64 << (retry - 1).min(16));
        let factor = if self.jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            1.0
        };
        Duration::from_millis((base as f64 * factor) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            retry: RetryPolicy::default(),
        }
    }
}

// Retryable failure observed on one attempt.
enum AttemptFailure {
    RateLimited { retry_after: Option<Duration> },
    Server { status: u16 },
    TimedOut { detail: String },
    Network { detail: String },
}

/// HTTP page fetcher with timeout, bounded retries and user-agent rotation.
/// Holds no mutable state and is safe to share across concurrent pipelines.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// GET a product page and return its body. Connection failures,
    /// timeouts, 5xx and 429 responses are retried with backoff; other
    /// 4xx responses fail immediately.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let max_retries = self.config.retry.max_retries;
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = match &last_failure {
                    // A server-provided delay takes precedence over backoff.
                    Some(AttemptFailure::RateLimited {
                        retry_after: Some(delay),
                    }) => *delay,
                    _ => self.config.retry.delay_for(attempt),
                };
                debug!(url, attempt, ?delay, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            match self.try_once(url).await {
                Ok(body) => {
                    debug!(url, attempt, "fetch succeeded");
                    return Ok(body);
                }
                Err(AttemptFailure::Server { status }) if !(500..=599).contains(&status) => {
                    // Non-retryable 4xx; surfaced immediately.
                    return Err(FetchError::ClientError { status });
                }
                Err(failure) => {
                    match &failure {
                        AttemptFailure::RateLimited { .. } => {
                            warn!(url, attempt, "rate limited")
                        }
                        AttemptFailure::Server { status } => {
                            warn!(url, attempt, status, "server error")
                        }
                        AttemptFailure::TimedOut { detail } => {
                            warn!(url, attempt, detail, "request timed out")
                        }
                        AttemptFailure::Network { detail } => {
                            warn!(url, attempt, detail, "connection failed")
                        }
                    }
                    last_failure = Some(failure);
                }
            }
        }

        let attempts = max_retries + 1;
        Err(match last_failure {
            Some(AttemptFailure::RateLimited { .. }) => FetchError::RateLimited { attempts },
            Some(AttemptFailure::TimedOut { detail }) => FetchError::Timeout { attempts, detail },
            Some(AttemptFailure::Server { status }) => FetchError::Network {
                attempts,
                detail: format!("HTTP {status}"),
            },
            Some(AttemptFailure::Network { detail }) => FetchError::Network { attempts, detail },
            None => FetchError::Network {
                attempts,
                detail: "no attempt recorded".to_string(),
            },
        })
    }

    async fn try_once(&self, url: &str) -> Result<String, AttemptFailure> {
        let user_agent = random_user_agent();
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9,en;q=0.8")
            .header(CONNECTION, "keep-alive")
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() {
            return response.text().await.map_err(|e| AttemptFailure::Network {
                detail: format!("failed to read body: {e}"),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AttemptFailure::RateLimited { retry_after });
        }

        Err(AttemptFailure::Server {
            status: status.as_u16(),
        })
    }
}

fn classify_request_error(err: reqwest::Error) -> AttemptFailure {
    if err.is_timeout() {
        AttemptFailure::TimedOut {
            detail: err.to_string(),
        }
    } else {
        AttemptFailure::Network {
            detail: err.to_string(),
        }
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(max_retries: u32) -> FetcherConfig {
        FetcherConfig {
            request_timeout_secs: 5,
            retry: RetryPolicy {
                max_retries,
                base_delay_ms: 1,
                jitter: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config(2)).unwrap();
        let body = fetcher.fetch(&format!("{}/product", server.uri())).await.unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config(3)).unwrap();
        let err = fetcher.fetch(&format!("{}/gone", server.uri())).await.unwrap_err();
        assert_eq!(err, FetchError::ClientError { status: 404 });
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config(3)).unwrap();
        let body = fetcher.fetch(&format!("{}/flaky", server.uri())).await.unwrap();
        assert_eq!(body, "recovered");
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config(2)).unwrap();
        let err = fetcher.fetch(&format!("{}/down", server.uri())).await.unwrap_err();
        match err {
            FetchError::Network { attempts, detail } => {
                assert_eq!(attempts, 3);
                assert!(detail.contains("500"));
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_reported_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config(1)).unwrap();
        let err = fetcher.fetch(&format!("{}/busy", server.uri())).await.unwrap_err();
        assert_eq!(err, FetchError::RateLimited { attempts: 2 });
    }

    #[tokio::test]
    async fn test_retry_after_takes_precedence_over_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        // Backoff alone would wait 30s before the retry.
        let fetcher = Fetcher::new(FetcherConfig {
            request_timeout_secs: 5,
            retry: RetryPolicy {
                max_retries: 1,
                base_delay_ms: 30_000,
                jitter: 0.0,
            },
        })
        .unwrap();

        let started = std::time::Instant::now();
        let body = fetcher.fetch(&format!("{}/busy", server.uri())).await.unwrap();
        let waited = started.elapsed();

        assert_eq!(body, "ok");
        assert!(waited >= Duration::from_secs(1), "waited {waited:?}");
        assert!(waited < Duration::from_secs(10), "waited {waited:?}");
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            jitter: 0.5,
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1).as_millis();
            assert!((100..=150).contains(&delay), "delay out of range: {delay}");
        }
    }
}
