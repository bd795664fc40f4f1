//! Scripted in-process browser engine.
//!
//! Used by the pool, solver and orchestrator tests and available to library
//! users who want to exercise the search flow without a real browser. The
//! engine serves a fixed set of result cards and can put a verification page
//! in front of them, passed either passively or with an injected token.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserEngine, BrowserInstance, PageDriver, SessionOptions, WaitPolicy};
use crate::error::ScrapeError;
use crate::models::{LinkRecord, SameSite, SessionCookie};
use crate::portal::{
    ARTICLE_SECTION_PARAM, CARD_SELECTOR, SITE_KEY_SELECTOR, SUBMIT_SELECTOR, VERIFICATION_MARKER,
};

/// Name of the clearance cookie handed out after verification
pub const CLEARANCE_COOKIE: &str = "cf_clearance";

/// Verification page put in front of search results
#[derive(Debug, Clone)]
pub struct MockChallenge {
    pub site_key: String,
    /// Clicking submit without a token passes the challenge
    pub passive_pass: bool,
    /// Expose the site key as a DOM attribute (otherwise only in inline script)
    pub site_key_in_dom: bool,
}

impl MockChallenge {
    pub fn turnstile(passive_pass: bool) -> Self {
        Self {
            site_key: "0x4AAAAAAAMockTurnstileKey".to_string(),
            passive_pass,
            site_key_in_dom: true,
        }
    }

    pub fn recaptcha() -> Self {
        Self {
            site_key: "6LcMockRecaptchaSiteKey".to_string(),
            passive_pass: false,
            site_key_in_dom: true,
        }
    }
}

/// What the mock engine serves
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Articles rendered as result cards
    pub links: Vec<LinkRecord>,
    pub challenge: Option<MockChallenge>,
    /// Artificial latency per navigation
    pub navigation_delay: Duration,
    /// Land on the search page without the article-section marker
    pub outside_article_section: bool,
}

impl MockScript {
    pub fn with_links(links: Vec<LinkRecord>) -> Self {
        Self {
            links,
            ..Default::default()
        }
    }

    pub fn challenge(mut self, challenge: MockChallenge) -> Self {
        self.challenge = Some(challenge);
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    navigations: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    instances_closed: AtomicUsize,
    pending_nav_failures: AtomicU32,
    pending_wait_failures: AtomicU32,
    fail_launches: AtomicBool,
    fail_queries: AtomicBool,
}

/// Scripted [`BrowserEngine`]
#[derive(Debug)]
pub struct MockBrowserEngine {
    script: Arc<MockScript>,
    counters: Arc<Counters>,
    connections: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockBrowserEngine {
    pub fn new(script: MockScript) -> Self {
        Self {
            script: Arc::new(script),
            counters: Arc::new(Counters::default()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn launch_count(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    /// Navigations across every page of every instance
    pub fn navigation_count(&self) -> usize {
        self.counters.navigations.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn instances_closed(&self) -> usize {
        self.counters.instances_closed.load(Ordering::SeqCst)
    }

    /// Make the next `count` navigations time out
    pub fn fail_next_navigations(&self, count: u32) {
        self.counters
            .pending_nav_failures
            .store(count, Ordering::SeqCst);
    }

    pub fn fail_launches(&self, fail: bool) {
        self.counters.fail_launches.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` navigation waits fail with a timeout
    pub fn fail_next_waits(&self, count: u32) {
        self.counters
            .pending_wait_failures
            .store(count, Ordering::SeqCst);
    }

    /// Make every element query fail as if the page had crashed
    pub fn fail_queries(&self, fail: bool) {
        self.counters.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Mark every instance launched so far as disconnected
    pub fn disconnect_all(&self) {
        let connections = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for connected in connections.iter() {
            connected.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserEngine for MockBrowserEngine {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>, ScrapeError> {
        if self.counters.fail_launches.load(Ordering::SeqCst) {
            return Err(ScrapeError::Browser("mock launch failure".to_string()));
        }

        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let connected = Arc::new(AtomicBool::new(true));
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(&connected));

        Ok(Arc::new(MockInstance {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            connected,
        }))
    }
}

struct MockInstance {
    script: Arc<MockScript>,
    counters: Arc<Counters>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserInstance for MockInstance {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_session(
        &self,
        _options: &SessionOptions,
    ) -> Result<Box<dyn PageDriver>, ScrapeError> {
        if !self.is_connected() {
            return Err(ScrapeError::Browser("mock browser disconnected".to_string()));
        }
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockPage {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        self.connected.store(false, Ordering::SeqCst);
        self.counters.instances_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PageState {
    requested_url: String,
    verified: bool,
    token_injected: bool,
    navigated_after_submit: bool,
    cookies: Vec<SessionCookie>,
}

struct MockPage {
    script: Arc<MockScript>,
    counters: Arc<Counters>,
    state: Mutex<PageState>,
}

impl MockPage {
    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn challenged(&self, state: &PageState) -> bool {
        self.script.challenge.is_some() && !state.verified
    }

    fn verification_url(requested: &str) -> String {
        let query = requested.split_once('?').map(|(_, q)| q).unwrap_or("");
        format!("https://dergipark.org.tr/tr/search-verification?{}", query)
    }

    fn verification_html(challenge: &MockChallenge) -> String {
        let widget = if challenge.site_key_in_dom {
            format!(r#"<div class="cf-turnstile" data-sitekey="{}"></div>"#, challenge.site_key)
        } else {
            format!(
                r#"<script>render({{ 'data-sitekey="{}"': true }});</script>"#,
                challenge.site_key
            )
        };
        format!(
            r#"<html><body><form name="search_verification">{}
<input type="hidden" name="cf-turnstile-response" value="">
<button type="submit" class="kt-hidden">Devam</button></form></body></html>"#,
            widget
        )
    }

    fn card_html(link: &LinkRecord) -> String {
        format!(
            r#"<div class="card article-card dp-card-outline"><div class="card-body"><h5 class="card-title"><a href="{}">{}</a></h5></div></div>"#,
            link.url, link.title
        )
    }

    fn pass_challenge(state: &mut PageState) {
        state.verified = true;
        state.navigated_after_submit = true;
        state.cookies.push(SessionCookie {
            name: CLEARANCE_COOKIE.to_string(),
            value: "mock-clearance".to_string(),
            domain: ".dergipark.org.tr".to_string(),
            path: "/".to_string(),
            expires: chrono::Utc::now().timestamp() + 3600,
            http_only: true,
            secure: true,
            same_site: Some(SameSite::None),
        });
        state.cookies.push(SessionCookie {
            name: "_ga".to_string(),
            value: "tracker".to_string(),
            domain: ".google-analytics.com".to_string(),
            path: "/".to_string(),
            expires: -1,
            http_only: false,
            secure: false,
            same_site: None,
        });
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(
        &self,
        url: &str,
        _wait: WaitPolicy,
        timeout: Duration,
    ) -> Result<(), ScrapeError> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .counters
            .pending_nav_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ScrapeError::NavigationTimeout(format!(
                "{} did not load within {:?}",
                url, timeout
            )));
        }

        if !self.script.navigation_delay.is_zero() {
            tokio::time::sleep(self.script.navigation_delay).await;
        }

        self.state().requested_url = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, function: &str, arg: Value) -> Result<Value, ScrapeError> {
        let mut state = self.state();
        let Some(challenge) = self.script.challenge.as_ref() else {
            return Ok(Value::Bool(true));
        };

        if function.contains("dispatchEvent") && arg.get("token").is_some() {
            state.token_injected = true;
            return Ok(Value::Bool(true));
        }

        let is_submit = function.contains(SUBMIT_SELECTOR)
            || arg.as_str() == Some(SUBMIT_SELECTOR)
            || arg.get("selector").and_then(|s| s.as_str()) == Some(SUBMIT_SELECTOR);
        if is_submit && !state.verified && (challenge.passive_pass || state.token_injected) {
            Self::pass_challenge(&mut state);
        }

        Ok(Value::Bool(true))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<String>, ScrapeError> {
        if self.counters.fail_queries.load(Ordering::SeqCst) {
            return Err(ScrapeError::Browser("mock page crashed".to_string()));
        }
        let state = self.state();
        if state.requested_url.is_empty() {
            return Ok(Vec::new());
        }

        if self.challenged(&state) {
            let html = match (&self.script.challenge, selector) {
                (Some(challenge), SITE_KEY_SELECTOR) if challenge.site_key_in_dom => vec![format!(
                    r#"<div class="cf-turnstile" data-sitekey="{}"></div>"#,
                    challenge.site_key
                )],
                _ => Vec::new(),
            };
            return Ok(html);
        }

        if selector == CARD_SELECTOR {
            return Ok(self.script.links.iter().map(Self::card_html).collect());
        }
        Ok(Vec::new())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        let state = self.state();
        if self.challenged(&state) {
            return Ok(Self::verification_url(&state.requested_url));
        }
        if self.script.outside_article_section {
            return Ok(state.requested_url.replace(&format!("&{}", ARTICLE_SECTION_PARAM), ""));
        }
        Ok(state.requested_url.clone())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        let state = self.state();
        match &self.script.challenge {
            Some(challenge) if !state.verified => Ok(Self::verification_html(challenge)),
            _ => Ok(format!(
                "<html><body>{}</body></html>",
                self.script
                    .links
                    .iter()
                    .map(Self::card_html)
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
        }
    }

    async fn cookies(&self, _urls: &[String]) -> Result<Vec<SessionCookie>, ScrapeError> {
        Ok(self.state().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<(), ScrapeError> {
        let mut state = self.state();
        if cookies.iter().any(|c| c.name == CLEARANCE_COOKIE) {
            state.verified = true;
        }
        state.cookies.extend(cookies.iter().cloned());
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool, ScrapeError> {
        let failed = self
            .counters
            .pending_wait_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ScrapeError::NavigationTimeout(format!(
                "no navigation within {:?}",
                timeout
            )));
        }
        let mut state = self.state();
        Ok(std::mem::take(&mut state.navigated_after_submit))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            user_agent: "test".to_string(),
            locale: "tr-TR".to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }

    #[tokio::test]
    async fn test_challenge_then_passive_pass() {
        let engine = MockBrowserEngine::new(
            MockScript::with_links(vec![LinkRecord::new("https://x/a", "A")])
                .challenge(MockChallenge::turnstile(true)),
        );
        let instance = engine.launch().await.unwrap();
        let page = instance.new_session(&options()).await.unwrap();

        page.navigate("https://dergipark.org.tr/tr/search?q=a", WaitPolicy::Load, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(page.current_url().await.unwrap().contains(VERIFICATION_MARKER));
        assert!(page.query_all(CARD_SELECTOR).await.unwrap().is_empty());

        page.evaluate("(sel) => document.querySelector(sel).click()", Value::String(SUBMIT_SELECTOR.to_string()))
            .await
            .unwrap();
        assert!(page.wait_for_navigation(Duration::from_secs(1)).await.unwrap());
        assert!(!page.current_url().await.unwrap().contains(VERIFICATION_MARKER));
        assert_eq!(page.query_all(CARD_SELECTOR).await.unwrap().len(), 1);
        assert_eq!(engine.navigation_count(), 1);
    }

    #[tokio::test]
    async fn test_clearance_cookie_skips_challenge() {
        let engine = MockBrowserEngine::new(
            MockScript::default().challenge(MockChallenge::recaptcha()),
        );
        let instance = engine.launch().await.unwrap();
        let page = instance.new_session(&options()).await.unwrap();

        page.set_cookies(&[SessionCookie {
            name: CLEARANCE_COOKIE.to_string(),
            value: "v".to_string(),
            domain: ".dergipark.org.tr".to_string(),
            path: "/".to_string(),
            expires: -1,
            http_only: false,
            secure: false,
            same_site: None,
        }])
        .await
        .unwrap();

        page.navigate("https://dergipark.org.tr/tr/search?q=a", WaitPolicy::Load, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!page.current_url().await.unwrap().contains(VERIFICATION_MARKER));
    }

    #[tokio::test]
    async fn test_scripted_navigation_failures() {
        let engine = MockBrowserEngine::new(MockScript::default());
        engine.fail_next_navigations(1);
        let instance = engine.launch().await.unwrap();
        let page = instance.new_session(&options()).await.unwrap();

        let first = page
            .navigate("https://x", WaitPolicy::Load, Duration::from_secs(1))
            .await;
        assert!(matches!(first, Err(ScrapeError::NavigationTimeout(_))));
        assert!(page
            .navigate("https://x", WaitPolicy::Load, Duration::from_secs(1))
            .await
            .is_ok());
        assert_eq!(engine.navigation_count(), 2);
    }
}
