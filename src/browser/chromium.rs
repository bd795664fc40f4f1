//! Chrome DevTools Protocol backend built on `chromiumoxide`.
//!
//! Each [`ChromiumInstance`] owns one browser process and the task driving
//! its CDP connection. Sessions are separate browser contexts, so cookies
//! never leak between concurrent requests on the same process.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, GetCookiesParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserEngine, BrowserInstance, PageDriver, SessionOptions, WaitPolicy};
use crate::config::BrowserConfig;
use crate::error::ScrapeError;
use crate::models::{SameSite, SessionCookie};

/// Launches headless Chrome/Chromium processes
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    config: BrowserConfig,
}

impl ChromiumEngine {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn launch_config(&self) -> Result<CdpBrowserConfig, ScrapeError> {
        let mut builder = CdpBrowserConfig::builder()
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--lang={}", self.config.locale));

        builder = if self.config.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };

        if let Some(path) = find_executable(self.config.chrome_executable.as_ref()) {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("invalid browser config: {}", e)))
    }
}

/// Resolve the browser binary: explicit config, `CHROME_EXECUTABLE`, then well-known paths.
///
/// `None` lets chromiumoxide run its own detection.
pub fn find_executable(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
        warn!("Configured browser executable does not exist: {}", path.display());
    }

    if let Ok(path) = std::env::var("CHROME_EXECUTABLE") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("CHROME_EXECUTABLE points to a missing file: {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    candidates.iter().map(PathBuf::from).find(|path| path.exists())
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>, ScrapeError> {
        let config = self.launch_config()?;
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        info!("Browser process launched");
        Ok(Arc::new(ChromiumInstance {
            inner: Arc::new(InstanceInner {
                browser,
                handler_task,
            }),
        }))
    }
}

/// One running browser process
pub struct ChromiumInstance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl InstanceInner {
    async fn dispose_context(&self, context_id: BrowserContextId) -> Result<(), ScrapeError> {
        self.browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await?;
        Ok(())
    }
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    fn is_connected(&self) -> bool {
        !self.inner.handler_task.is_finished()
    }

    async fn new_session(&self, options: &SessionOptions) -> Result<Box<dyn PageDriver>, ScrapeError> {
        let context_id = self
            .inner
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(ScrapeError::Browser)?;

        let page = match self.inner.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(dispose) = self.inner.dispose_context(context_id).await {
                    debug!("Failed to dispose browser context: {}", dispose);
                }
                return Err(e.into());
            }
        };

        let session = ChromiumPage {
            page,
            context_id,
            instance: Arc::clone(&self.inner),
        };
        if let Err(e) = session.apply_options(options).await {
            let _ = session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        if let Err(e) = self.inner.browser.execute(CloseParams::default()).await {
            debug!("Browser close command failed: {}", e);
        }
        self.inner.handler_task.abort();
        Ok(())
    }
}

/// A page living in its own browser context
pub struct ChromiumPage {
    page: Page,
    context_id: BrowserContextId,
    instance: Arc<InstanceInner>,
}

impl ChromiumPage {
    async fn apply_options(&self, options: &SessionOptions) -> Result<(), ScrapeError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await?;
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(options.viewport_width),
                i64::from(options.viewport_height),
                1.0,
                false,
            ))
            .await?;
        self.page
            .execute(
                SetLocaleOverrideParams::builder()
                    .locale(options.locale.clone())
                    .build(),
            )
            .await?;
        Ok(())
    }
}

fn to_cdp_same_site(same_site: SameSite) -> CookieSameSite {
    match same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

fn from_cdp_same_site(same_site: &CookieSameSite) -> SameSite {
    match same_site {
        CookieSameSite::Strict => SameSite::Strict,
        CookieSameSite::Lax => SameSite::Lax,
        CookieSameSite::None => SameSite::None,
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<(), ScrapeError> {
        let navigation = async {
            match wait {
                WaitPolicy::Load => {
                    self.page.goto(url).await?;
                }
                WaitPolicy::Commit => {
                    let params = NavigateParams::builder()
                        .url(url)
                        .build()
                        .map_err(ScrapeError::InvalidUrl)?;
                    self.page.execute(params).await?;
                }
            }
            Ok::<(), ScrapeError>(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| ScrapeError::NavigationTimeout(format!("{} did not load within {:?}", url, timeout)))?
    }

    async fn evaluate(&self, function: &str, arg: Value) -> Result<Value, ScrapeError> {
        let expression = format!("({})({})", function, serde_json::to_string(&arg)?);
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(ScrapeError::Browser)?;

        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<String>, ScrapeError> {
        let value = self
            .evaluate(
                "(sel) => Array.from(document.querySelectorAll(sel)).map((el) => el.outerHTML)",
                Value::String(selector.to_string()),
            )
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        Ok(self.page.content().await?)
    }

    async fn cookies(&self, urls: &[String]) -> Result<Vec<SessionCookie>, ScrapeError> {
        let params = if urls.is_empty() {
            GetCookiesParams::default()
        } else {
            GetCookiesParams::builder().urls(urls.to_vec()).build()
        };
        let cookies = self.page.execute(params).await?.result.cookies;

        Ok(cookies
            .iter()
            .map(|c| SessionCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                expires: if c.session { -1 } else { c.expires as i64 },
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.as_ref().map(from_cdp_same_site),
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<(), ScrapeError> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .http_only(cookie.http_only)
                .secure(cookie.secure);
            if cookie.expires > 0 {
                builder = builder.expires(TimeSinceEpoch::new(cookie.expires as f64));
            }
            if let Some(same_site) = cookie.same_site {
                builder = builder.same_site(to_cdp_same_site(same_site));
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!("Skipping cookie {}: {}", cookie.name, e),
            }
        }

        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool, ScrapeError> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(result) => {
                result?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed: {}", e);
        }
        self.instance.dispose_context(self.context_id.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_site_mapping() {
        for same_site in [SameSite::Strict, SameSite::Lax, SameSite::None] {
            assert_eq!(from_cdp_same_site(&to_cdp_same_site(same_site)), same_site);
        }
    }

    #[test]
    fn test_missing_configured_executable_is_skipped() {
        let missing = PathBuf::from("/nonexistent/chrome-binary");
        let found = find_executable(Some(&missing));
        assert_ne!(found.as_ref(), Some(&missing));
    }

    #[test]
    fn test_launch_config_builds() {
        let engine = ChromiumEngine::new(BrowserConfig {
            chrome_executable: Some(PathBuf::from("/bin/sh")),
            ..Default::default()
        });
        assert!(engine.launch_config().is_ok());
    }
}
