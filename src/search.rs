//! Search orchestration: cached link discovery through the browser pool,
//! challenge handling, pagination and detail fetching.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{click, wait_for_selector, BrowserResourcePool, PageDriver, PageLease, WaitPolicy};
use crate::cache::{CacheStore, LinkResultCache, SessionCookieStore};
use crate::captcha::ChallengeSolver;
use crate::config::{BrowserConfig, Config, PortalConfig};
use crate::error::ScrapeError;
use crate::models::{LinkRecord, Pagination, SearchQuery, SearchResponse};
use crate::portal::{
    extract_links, DetailFetcher, ARTICLE_SECTION_PARAM, CARD_SELECTOR, COOKIE_DOMAIN_MARKER,
    SECTION_LINK_SELECTOR,
};
use crate::utils::{with_retry, RetryConfig};

/// Where a link discovery currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Navigating,
    ChallengeDetected,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchPhase::Idle => "idle",
            SearchPhase::Navigating => "navigating",
            SearchPhase::ChallengeDetected => "challenge-detected",
            SearchPhase::Extracting => "extracting",
            SearchPhase::Done => "done",
            SearchPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct PhaseLog<'a> {
    url: &'a str,
    phase: SearchPhase,
}

impl<'a> PhaseLog<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            phase: SearchPhase::Idle,
        }
    }

    fn enter(&mut self, next: SearchPhase) {
        tracing::debug!("search {} -> {} ({})", self.phase, next, self.url);
        self.phase = next;
    }
}

/// Components the orchestrator drives
pub struct SearchComponents {
    pub pool: Arc<BrowserResourcePool>,
    pub solver: Arc<ChallengeSolver>,
    pub cookies: Arc<SessionCookieStore>,
    pub links: Arc<LinkResultCache>,
    pub fetcher: Arc<DetailFetcher>,
}

/// Runs searches end to end
pub struct SearchOrchestrator {
    pool: Arc<BrowserResourcePool>,
    solver: Arc<ChallengeSolver>,
    cookies: Arc<SessionCookieStore>,
    links: Arc<LinkResultCache>,
    fetcher: Arc<DetailFetcher>,
    portal: PortalConfig,
    browser: BrowserConfig,
    navigation_retry: RetryConfig,
}

impl SearchOrchestrator {
    pub fn new(config: &Config, components: SearchComponents) -> Self {
        Self {
            pool: components.pool,
            solver: components.solver,
            cookies: components.cookies,
            links: components.links,
            fetcher: components.fetcher,
            portal: config.portal.clone(),
            browser: config.browser.clone(),
            navigation_retry: RetryConfig::linear(
                config.fetch.retry_attempts,
                Duration::from_millis(config.fetch.retry_backoff_millis),
            ),
        }
    }

    /// Run a search: link discovery (cached), pagination, then detail fetching
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ScrapeError> {
        let search_url = query.build_search_url(&self.portal.base_url, &self.portal.search_path);
        tracing::info!(
            "Search {} (output page {}, page size {})",
            search_url,
            query.output_page,
            self.portal.page_size
        );

        let links = self.links_for(query, &search_url).await?;

        let pagination = Pagination::new(query.output_page, self.portal.page_size, links.len());
        let range = pagination.slice_range();
        tracing::debug!(
            "Links: total={}, slice={:?} (page {}/{})",
            links.len(),
            range,
            pagination.api_page,
            pagination.total_api_pages
        );

        if range.is_empty() {
            return Ok(SearchResponse::empty(pagination));
        }

        let articles = self
            .fetcher
            .fetch_all(&links[range], &search_url, query.index_filter)
            .await;

        Ok(SearchResponse {
            pagination,
            articles,
        })
    }

    /// Link list for the query's result page, from cache or a browser scrape
    pub async fn links_for(
        &self,
        query: &SearchQuery,
        search_url: &str,
    ) -> Result<Vec<LinkRecord>, ScrapeError> {
        let key = query.links_cache_key();
        if let Some(links) = self.links.get(&key) {
            tracing::info!("Links cache hit: {} ({} links)", key, links.len());
            return Ok(links);
        }
        tracing::info!("Links cache miss: {}", key);

        let lease = self.pool.acquire().await?;
        let result = self.scrape(&lease, search_url).await;
        self.pool.release(lease).await;

        let links = result?;
        self.links.set(key, links.clone());
        Ok(links)
    }

    async fn scrape(&self, lease: &PageLease, search_url: &str) -> Result<Vec<LinkRecord>, ScrapeError> {
        let page = lease.page.as_ref();
        let mut phase = PhaseLog::new(search_url);

        self.inject_cookies(page).await;

        phase.enter(SearchPhase::Navigating);
        let navigation_timeout = self.browser.navigation_timeout();
        let navigated = with_retry(self.navigation_retry, || {
            page.navigate(search_url, WaitPolicy::Load, navigation_timeout)
        })
        .await;
        if let Err(e) = navigated {
            phase.enter(SearchPhase::Failed);
            return Err(e);
        }

        phase.enter(SearchPhase::ChallengeDetected);
        let outcome = match self.solver.resolve(page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                phase.enter(SearchPhase::Failed);
                return Err(e);
            }
        };

        phase.enter(SearchPhase::Extracting);
        self.ensure_article_section(page).await?;

        let found = wait_for_selector(page, CARD_SELECTOR, self.browser.results_wait()).await?;
        let links = if found {
            let cards = page.query_all(CARD_SELECTOR).await?;
            extract_links(&cards, &self.portal.base_url)
        } else {
            tracing::info!("No result cards on {}", search_url);
            Vec::new()
        };
        tracing::info!("Found {} article links", links.len());

        if outcome.passed_challenge() {
            tracing::info!("Challenge passed ({:?}), saving session", outcome);
            self.persist_session(page).await;
            self.pool.mark_authenticated(lease.handle_id).await;
        }

        phase.enter(SearchPhase::Done);
        Ok(links)
    }

    /// Replay stored session cookies into a fresh context
    async fn inject_cookies(&self, page: &dyn PageDriver) {
        let Some(set) = self.cookies.load() else {
            return;
        };
        match page.set_cookies(&set.cookies).await {
            Ok(()) => tracing::debug!("Injected {} stored session cookies", set.cookies.len()),
            Err(e) => tracing::warn!("Failed to inject session cookies: {}", e),
        }
    }

    async fn ensure_article_section(&self, page: &dyn PageDriver) -> Result<(), ScrapeError> {
        let url = page.current_url().await?;
        if url.contains(ARTICLE_SECTION_PARAM) {
            return Ok(());
        }

        tracing::debug!("Switching to the article section");
        if click(page, SECTION_LINK_SELECTOR).await? {
            if let Err(e) = page.wait_for_navigation(Duration::from_secs(3)).await {
                tracing::warn!("Article section did not load, extracting from current page: {}", e);
            }
        }
        Ok(())
    }

    /// Save the portal's cookies after a passed challenge; failures are only logged
    async fn persist_session(&self, page: &dyn PageDriver) {
        let cookies = match page.cookies(&[self.portal.base_url.clone()]).await {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!("Failed to read session cookies: {}", e);
                return;
            }
        };

        let portal_cookies: Vec<_> = cookies
            .into_iter()
            .filter(|c| c.domain.contains(COOKIE_DOMAIN_MARKER))
            .collect();

        if let Err(e) = self.cookies.save(portal_cookies) {
            tracing::warn!("Failed to persist session cookies: {}", e);
        }
    }

    pub fn pool(&self) -> &Arc<BrowserResourcePool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBrowserEngine, MockChallenge, MockScript, CLEARANCE_COOKIE};
    use crate::cache::TtlCache;
    use crate::utils::HttpClient;

    struct Harness {
        engine: Arc<MockBrowserEngine>,
        orchestrator: SearchOrchestrator,
        cookies: Arc<SessionCookieStore>,
        _dir: tempfile::TempDir,
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.browser.pool_size = 1;
        config.browser.results_wait_secs = 0;
        config.captcha.api_key = None;
        config.captcha.passive_wait_secs = 0;
        config.captcha.settle_millis = 0;
        config.fetch.retry_backoff_millis = 1;
        config
    }

    async fn harness(script: MockScript, config: Config) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockBrowserEngine::new(script));
        let pool = Arc::new(BrowserResourcePool::new(engine.clone(), config.browser.clone()));
        pool.init().await.unwrap();

        let http = HttpClient::new().unwrap();
        let cookies = Arc::new(SessionCookieStore::new(
            Duration::from_secs(config.cache.cookies_ttl_secs),
            dir.path().join("cookies.json"),
        ));
        let components = SearchComponents {
            pool,
            solver: Arc::new(ChallengeSolver::new(config.captcha.clone(), http.clone())),
            cookies: cookies.clone(),
            links: Arc::new(TtlCache::new(Duration::from_secs(600), 100)),
            fetcher: Arc::new(DetailFetcher::new(
                Arc::new(http),
                config.fetch.clone(),
                config.portal.base_url.clone(),
            )),
        };

        Harness {
            engine,
            orchestrator: SearchOrchestrator::new(&config, components),
            cookies,
            _dir: dir,
        }
    }

    fn links(n: usize) -> Vec<LinkRecord> {
        (0..n)
            .map(|i| LinkRecord::new(format!("http://127.0.0.1:1/a/{}", i), format!("A{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_links_cached_across_output_pages() {
        let h = harness(MockScript::with_links(links(3)), test_config()).await;
        let query = SearchQuery::new("tarih");

        let url = query.build_search_url("https://dergipark.org.tr", "/tr/search");
        let first = h.orchestrator.links_for(&query, &url).await.unwrap();
        let second_query = query.clone().output_page(2);
        let second = h.orchestrator.links_for(&second_query, &url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.engine.navigation_count(), 1);
        assert_eq!(h.engine.sessions_opened(), h.engine.sessions_closed());
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_empty() {
        let h = harness(MockScript::with_links(links(3)), test_config()).await;

        let response = h
            .orchestrator
            .search(&SearchQuery::new("tarih").output_page(5))
            .await
            .unwrap();
        assert!(response.articles.is_empty());
        assert_eq!(response.pagination.total_items_on_result_page, 3);
        assert_eq!(response.pagination.total_api_pages, 1);
    }

    #[tokio::test]
    async fn test_no_results_is_not_an_error() {
        let h = harness(MockScript::default(), test_config()).await;

        let response = h.orchestrator.search(&SearchQuery::new("yok")).await.unwrap();
        assert_eq!(response.pagination.total_api_pages, 0);
        assert!(response.articles.is_empty());
    }

    #[tokio::test]
    async fn test_navigation_retried_once() {
        let h = harness(MockScript::with_links(links(1)), test_config()).await;
        h.engine.fail_next_navigations(1);

        let query = SearchQuery::new("retry");
        let url = query.build_search_url("https://dergipark.org.tr", "/tr/search");
        let found = h.orchestrator.links_for(&query, &url).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(h.engine.navigation_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_navigation_failure() {
        let h = harness(MockScript::with_links(links(1)), test_config()).await;
        h.engine.fail_next_navigations(5);

        let err = h.orchestrator.search(&SearchQuery::new("x")).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationTimeout(_)));
        assert_eq!(h.engine.sessions_opened(), h.engine.sessions_closed());
    }

    #[tokio::test]
    async fn test_passive_challenge_persists_portal_cookies() {
        let script = MockScript::with_links(links(2)).challenge(MockChallenge::turnstile(true));
        let h = harness(script, test_config()).await;

        let query = SearchQuery::new("challenge");
        let url = query.build_search_url("https://dergipark.org.tr", "/tr/search");
        let found = h.orchestrator.links_for(&query, &url).await.unwrap();
        assert_eq!(found.len(), 2);

        let stored = h.cookies.load().unwrap();
        assert_eq!(stored.cookies.len(), 1);
        assert_eq!(stored.cookies[0].name, CLEARANCE_COOKIE);
        assert!(h.orchestrator.pool().handles().await[0].authenticated);
    }

    #[tokio::test]
    async fn test_unsolved_challenge_fails_and_releases() {
        let script = MockScript::with_links(links(2)).challenge(MockChallenge::recaptcha());
        let h = harness(script, test_config()).await;

        let err = h.orchestrator.search(&SearchQuery::new("x")).await.unwrap_err();
        assert!(matches!(err, ScrapeError::CaptchaUnsolved(_)));
        assert!(h.cookies.load().is_none());
        assert_eq!(h.engine.sessions_opened(), h.engine.sessions_closed());
    }

    #[tokio::test]
    async fn test_section_switch_timeout_still_extracts() {
        let script = MockScript {
            outside_article_section: true,
            ..MockScript::with_links(links(2))
        };
        let h = harness(script, test_config()).await;
        h.engine.fail_next_waits(1);

        let query = SearchQuery::new("sekme");
        let url = query.build_search_url("https://dergipark.org.tr", "/tr/search");
        let found = h.orchestrator.links_for(&query, &url).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(h.engine.sessions_opened(), h.engine.sessions_closed());
    }
}
