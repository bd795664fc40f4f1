//! Browser automation capability and the browser resource pool.
//!
//! All automation goes through three traits so the orchestration code never
//! touches a concrete engine:
//!
//! - [`BrowserEngine`] launches long-lived [`BrowserInstance`]s
//! - [`BrowserInstance::new_session`] opens an isolated browsing context with a page
//! - [`PageDriver`] drives that page (navigation, script evaluation, cookies)
//!
//! [`chromium`] implements them over the Chrome DevTools Protocol and
//! [`mock`] provides a scripted engine for tests.

pub mod chromium;
pub mod mock;
mod pool;

pub use pool::{BrowserHandle, BrowserResourcePool, PageLease};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::models::SessionCookie;

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Wait for the load event
    #[default]
    Load,
    /// Return as soon as the navigation was committed
    Commit,
}

/// Settings applied to every new browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub user_agent: String,
    pub locale: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Launches browser instances
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>, ScrapeError>;
}

/// One running browser process
#[async_trait]
pub trait BrowserInstance: Send + Sync {
    /// Whether the connection to the browser is still alive
    fn is_connected(&self) -> bool;

    /// Open an isolated browsing context (own cookie jar) with one page
    async fn new_session(&self, options: &SessionOptions)
        -> Result<Box<dyn PageDriver>, ScrapeError>;

    /// Terminate the browser process
    async fn close(&self) -> Result<(), ScrapeError>;
}

/// A page inside an isolated browsing context
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> Result<(), ScrapeError>;

    /// Evaluate a JavaScript function expression called with `arg`, returning
    /// its (awaited) JSON result
    async fn evaluate(&self, function: &str, arg: Value) -> Result<Value, ScrapeError>;

    /// Outer HTML of every element matching `selector`
    async fn query_all(&self, selector: &str) -> Result<Vec<String>, ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    /// Full serialized DOM
    async fn content(&self) -> Result<String, ScrapeError>;

    /// Cookies visible to the given URLs (all context cookies when empty)
    async fn cookies(&self, urls: &[String]) -> Result<Vec<SessionCookie>, ScrapeError>;

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<(), ScrapeError>;

    /// Wait for an in-flight navigation; `Ok(false)` if none finished in time
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool, ScrapeError>;

    /// Close the page and dispose of its browsing context
    async fn close(&self) -> Result<(), ScrapeError>;
}

/// Poll until `selector` matches at least one element; `false` on timeout
pub async fn wait_for_selector(
    page: &dyn PageDriver,
    selector: &str,
    timeout: Duration,
) -> Result<bool, ScrapeError> {
    const POLL: Duration = Duration::from_millis(250);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if !page.query_all(selector).await?.is_empty() {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Click the first element matching `selector`; `false` if none exists
pub async fn click(page: &dyn PageDriver, selector: &str) -> Result<bool, ScrapeError> {
    let clicked = page
        .evaluate(
            "(sel) => { const el = document.querySelector(sel); if (!el) return false; el.click(); return true; }",
            Value::String(selector.to_string()),
        )
        .await?;
    Ok(clicked.as_bool().unwrap_or(false))
}
