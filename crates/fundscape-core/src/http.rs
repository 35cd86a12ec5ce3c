//! Shared HTTP client and tokio runtime.
//!
//! Uses async reqwest internally but presents a blocking interface, so the
//! sequential collection run can call it from plain functions.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP tuning shared by every outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Whole-request timeout (send + body)
    pub read_timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Set the process-wide HTTP config. Must run before the first request;
/// later calls are ignored.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, keeping the first value");
    }
}

/// Current HTTP config (defaults if never set).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Error from a single outbound request.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// No answer within the read timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection, TLS or body decoding failure
    #[error("HTTP error: {0}")]
    Transport(String),
}

impl HttpError {
    /// Convert a reqwest error, dropping the URL so query strings stay out of logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(http_config().read_timeout);
        }
        let status = e.status().map(|s| s.as_u16());
        let e = e.without_url();
        match status {
            Some(status) => Self::Status {
                status,
                message: e.to_string(),
            },
            None => Self::Transport(e.to_string()),
        }
    }

    /// 429, 5xx, timeouts and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 500..=599),
            Self::Timeout(_) | Self::Transport(_) => true,
        }
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(http_config().read_timeout)
        .user_agent(concat!("fundscape/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for blocking HTTP calls.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Blocking GET returning the response body as text.
///
/// Must not be called from inside an async context.
pub fn get_text(url: &str, query: &[(&str, &str)]) -> Result<String, HttpError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = http_client()
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(HttpError::from_reqwest)?;
        response.text().await.map_err(HttpError::from_reqwest)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> HttpError {
        HttpError::Status {
            status: code,
            message: "test".to_string(),
        }
    }

    #[test]
    fn rate_limited_is_retryable() {
        assert!(status(429).is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn timeout_and_transport_are_retryable() {
        assert!(HttpError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(HttpError::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn display_status() {
        assert_eq!(format!("{}", status(404)), "HTTP 404: test");
    }

    #[test]
    fn default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }
}
