//! fundscape-core - Shared infrastructure for the funding landscape pipeline
//!
//! Logging, progress display, the shared HTTP client and runtime, request
//! pacing and retry policy, breadth caps, and the shutdown flag.

pub mod budget;
pub mod caps;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use budget::RequestBudget;
pub use caps::BreadthCaps;
pub use http::{
    HttpConfig, HttpError, SHARED_RUNTIME, get_text, http_client, http_config, set_http_config,
};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{RetryPolicy, Retryable, backoff_duration, retry_with_backoff};
pub use shutdown::{install_signal_handlers, shutdown_flag};
