//! Utility modules supporting scraping operations.
//!
//! - [`HttpClient`]: shared reqwest client with browser-like defaults
//! - [`RetryConfig`] / [`with_retry`]: bounded retry with linear or exponential backoff
//! - [`truncate_words`]: word-based truncation used for abstracts
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use dergipark_mcp::utils::{with_retry, RetryConfig};
//! use dergipark_mcp::ScrapeError;
//! use std::time::Duration;
//!
//! # async fn fetch_page() -> Result<String, ScrapeError> { Ok("html".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), ScrapeError> {
//! let config = RetryConfig::linear(2, Duration::from_millis(1500));
//! let html = with_retry(config, || fetch_page()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;
mod text;

pub use http::{Download, HttpClient, DEFAULT_USER_AGENT};
pub use retry::{with_retry, with_retry_detailed, Backoff, RetryConfig, RetryResult};
pub use text::{contains_any_ignore_case, is_http_url, truncate_words};
