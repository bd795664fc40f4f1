//! Verification-page handling: detection, the passive pass and token
//! solving through CapSolver.

mod capsolver;

pub use capsolver::CapSolverClient;

use serde_json::json;
use std::time::Duration;

use crate::browser::PageDriver;
use crate::config::CaptchaConfig;
use crate::error::ScrapeError;
use crate::models::ChallengeKind;
use crate::portal::{is_verification_url, SITE_KEY_SELECTOR, SUBMIT_SELECTOR};
use crate::utils::HttpClient;

/// Reveals the (initially hidden) submit button and clicks it
const UNHIDE_AND_SUBMIT_JS: &str = r#"({ selector }) => {
    const button = document.querySelector(selector);
    if (!button) return false;
    button.classList.remove('kt-hidden');
    button.style.display = 'block';
    button.disabled = false;
    button.click();
    return true;
}"#;

/// Writes the token into the response fields and notifies listeners
const INJECT_TOKEN_JS: &str = r#"({ selector, token, events }) => {
    const targets = document.querySelectorAll(selector);
    targets.forEach((el) => {
        el.value = token;
        if (el.tagName === 'TEXTAREA') {
            el.innerHTML = token;
            el.style.display = 'block';
        }
        events.forEach((name) => el.dispatchEvent(new Event(name, { bubbles: true })));
    });
    return targets.length;
}"#;

/// How a page got past (or never met) the verification step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    NotChallenged,
    PassedPassively,
    Solved,
}

impl ChallengeOutcome {
    /// Whether a challenge was actually passed on this page
    pub fn passed_challenge(&self) -> bool {
        !matches!(self, ChallengeOutcome::NotChallenged)
    }
}

/// Whether the page's current URL is a verification page
pub fn detect(url: &str) -> bool {
    is_verification_url(url)
}

/// Pull a site key out of HTML via its `data-sitekey` attribute
pub fn extract_site_key(html: &str) -> Option<String> {
    let re = regex::Regex::new(r#"data-sitekey=["']([^"']+)["']"#).ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Passes verification pages, passively first and then with a solved token
pub struct ChallengeSolver {
    config: CaptchaConfig,
    client: Option<CapSolverClient>,
}

impl ChallengeSolver {
    pub fn new(config: CaptchaConfig, http: HttpClient) -> Self {
        let client = CapSolverClient::from_config(http, &config);
        if client.is_none() {
            tracing::info!("No CapSolver API key configured; only passive verification is available");
        }
        Self { config, client }
    }

    /// Replace the service client (endpoint or polling overrides)
    pub fn with_client(mut self, client: CapSolverClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn has_service(&self) -> bool {
        self.client.is_some()
    }

    /// Get `page` past a verification page if it is on one.
    ///
    /// Returns `CaptchaUnsolved` when both the passive pass and the solving
    /// service fail.
    pub async fn resolve(&self, page: &dyn PageDriver) -> Result<ChallengeOutcome, ScrapeError> {
        let url = page.current_url().await?;
        if !detect(&url) {
            return Ok(ChallengeOutcome::NotChallenged);
        }
        tracing::info!("Verification page detected: {}", url);

        if self.passive_pass(page).await? {
            tracing::info!("Verification passed without solving");
            return Ok(ChallengeOutcome::PassedPassively);
        }

        if self.solve(page).await? {
            tracing::info!("Verification passed with solved token");
            return Ok(ChallengeOutcome::Solved);
        }

        Err(ScrapeError::CaptchaUnsolved(format!(
            "still on verification page: {}",
            page.current_url().await.unwrap_or(url)
        )))
    }

    /// Wait, reveal the submit button and click it without any token.
    ///
    /// Browser errors count as a failed pass.
    pub async fn passive_pass(&self, page: &dyn PageDriver) -> Result<bool, ScrapeError> {
        match self.try_passive_pass(page).await {
            Ok(passed) => Ok(passed),
            Err(e) => {
                tracing::warn!("Passive verification attempt failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn try_passive_pass(&self, page: &dyn PageDriver) -> Result<bool, ScrapeError> {
        tokio::time::sleep(Duration::from_secs(self.config.passive_wait_secs)).await;

        let clicked = self.submit(page).await?;
        if !clicked {
            tracing::debug!("No submit button on verification page");
            return Ok(false);
        }
        page.wait_for_navigation(Duration::from_secs(3)).await?;

        Ok(!detect(&page.current_url().await?))
    }

    /// Solve the challenge through the solving service.
    ///
    /// Any failed step (no key, no site key, rejected or timed-out task,
    /// browser error) yields `Ok(false)`.
    pub async fn solve(&self, page: &dyn PageDriver) -> Result<bool, ScrapeError> {
        match self.try_solve(page).await {
            Ok(solved) => Ok(solved),
            Err(e) => {
                tracing::warn!("Challenge solving aborted: {}", e);
                Ok(false)
            }
        }
    }

    async fn try_solve(&self, page: &dyn PageDriver) -> Result<bool, ScrapeError> {
        let Some(client) = self.client.as_ref() else {
            tracing::warn!("Verification page needs solving but no API key is configured");
            return Ok(false);
        };

        let Some(site_key) = self.find_site_key(page).await? else {
            tracing::warn!("No site key on verification page");
            return Ok(false);
        };

        let kind = ChallengeKind::from_site_key(&site_key);
        let page_url = page.current_url().await?;
        tracing::info!("Solving {:?} challenge (site key {})", kind, site_key);

        let token = match client.create_task(kind, &page_url, &site_key).await {
            Ok(mut task) => client.wait_for_token(&mut task).await,
            Err(e) => Err(e),
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Solving service gave no token: {}", e);
                return Ok(false);
            }
        };

        let injected = page
            .evaluate(
                INJECT_TOKEN_JS,
                json!({
                    "selector": kind.response_selector(),
                    "token": token,
                    "events": kind.dispatch_events(),
                }),
            )
            .await?;
        tracing::debug!("Token injected into {} element(s)", injected);

        tokio::time::sleep(Duration::from_millis(self.config.settle_millis)).await;

        if !self.submit(page).await? {
            tracing::warn!("Submit button missing after token injection");
        }
        let navigated = page
            .wait_for_navigation(Duration::from_secs(self.config.submit_timeout_secs))
            .await?;

        let final_url = page.current_url().await?;
        tracing::debug!("After submit (navigated={}): {}", navigated, final_url);
        Ok(navigated && !detect(&final_url))
    }

    /// Site key from a `data-sitekey` element, else from the raw page source
    pub async fn find_site_key(&self, page: &dyn PageDriver) -> Result<Option<String>, ScrapeError> {
        let elements = page.query_all(SITE_KEY_SELECTOR).await?;
        if let Some(key) = elements.iter().find_map(|html| extract_site_key(html)) {
            return Ok(Some(key));
        }

        let content = page.content().await?;
        Ok(extract_site_key(&content))
    }

    async fn submit(&self, page: &dyn PageDriver) -> Result<bool, ScrapeError> {
        let clicked = page
            .evaluate(UNHIDE_AND_SUBMIT_JS, json!({ "selector": SUBMIT_SELECTOR }))
            .await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }
}
