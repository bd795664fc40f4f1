//! Lifecycle-managed facade over the scraping components.
//!
//! [`DergiparkService::init`] launches the browser pool and wires the caches,
//! the challenge solver, the detail fetcher and the PDF pipeline together.
//! Call [`DergiparkService::shutdown`] before exit to close the browsers.

use std::sync::Arc;
use std::time::Duration;

use crate::browser::chromium::ChromiumEngine;
use crate::browser::{BrowserEngine, BrowserResourcePool};
use crate::cache::{LinkResultCache, PdfCache, SessionCookieStore};
use crate::captcha::ChallengeSolver;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::models::{ReferencesResult, SearchQuery, SearchResponse};
use crate::pdf::{MistralOcr, OcrService, PdfExtractionPipeline, TextExtractor};
use crate::portal::{fetch_references, DetailFetcher};
use crate::search::{SearchComponents, SearchOrchestrator};
use crate::summary::{summary_prompt, MistralSummarizer, Summarizer, SUMMARY_SYSTEM_PROMPT};
use crate::utils::{is_http_url, HttpClient};

/// Public entry point: search, PDF conversion and reference lookup
pub struct DergiparkService {
    config: Config,
    http: HttpClient,
    pool: Arc<BrowserResourcePool>,
    orchestrator: SearchOrchestrator,
    pdf: PdfExtractionPipeline,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl std::fmt::Debug for DergiparkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DergiparkService")
            .field("base_url", &self.config.portal.base_url)
            .finish_non_exhaustive()
    }
}

impl DergiparkService {
    /// Start the service with a Chromium-backed browser pool
    pub async fn init(config: Config) -> Result<Self, ScrapeError> {
        let engine = Arc::new(ChromiumEngine::new(config.browser.clone()));
        Self::with_engine(config, engine).await
    }

    /// Start the service with any browser engine
    pub async fn with_engine(
        config: Config,
        engine: Arc<dyn BrowserEngine>,
    ) -> Result<Self, ScrapeError> {
        let http = HttpClient::new()?;

        let pool = Arc::new(BrowserResourcePool::new(engine, config.browser.clone()));
        pool.init().await?;

        let solver = ChallengeSolver::new(config.captcha.clone(), http.clone());
        if !solver.has_service() {
            tracing::warn!("CAPSOLVER_API_KEY not set, only passive challenge passes are possible");
        }

        let cookies = SessionCookieStore::from_config(&config.cache);
        tracing::debug!("Session cookie file: {}", cookies.path().display());

        let links = LinkResultCache::new(
            Duration::from_secs(config.cache.links_ttl_secs),
            config.cache.links_max_entries,
        );
        let fetcher = DetailFetcher::new(
            Arc::new(http.clone()),
            config.fetch.clone(),
            config.portal.base_url.clone(),
        );

        let orchestrator = SearchOrchestrator::new(
            &config,
            SearchComponents {
                pool: Arc::clone(&pool),
                solver: Arc::new(solver),
                cookies: Arc::new(cookies),
                links: Arc::new(links),
                fetcher: Arc::new(fetcher),
            },
        );

        let pdf_cache = Arc::new(PdfCache::new(
            Duration::from_secs(config.cache.pdf_ttl_secs),
            config.cache.pdf_max_entries,
        ));
        let ocr = MistralOcr::from_config(http.clone(), &config.ocr)
            .map(|ocr| Arc::new(ocr) as Arc<dyn OcrService>);
        let pdf = PdfExtractionPipeline::new(&config.pdf, pdf_cache, ocr)?;
        let summarizer = MistralSummarizer::from_config(http.clone(), &config.summary)
            .map(|model| Arc::new(model) as Arc<dyn Summarizer>);

        tracing::info!("DergiPark service ready");

        Ok(Self {
            config,
            http,
            pool,
            orchestrator,
            pdf,
            summarizer,
        })
    }

    /// Replace the local PDF text extractor
    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.pdf = self.pdf.with_extractor(extractor);
        self
    }

    /// Replace the summarization model
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BrowserResourcePool> {
        &self.pool
    }

    /// Search articles and fetch details for one output page
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ScrapeError> {
        self.orchestrator.search(query).await
    }

    /// Convert a PDF to a readable HTML page
    pub async fn pdf_to_readable(&self, url: &str) -> Result<String, ScrapeError> {
        if !is_http_url(url) {
            return Err(ScrapeError::InvalidUrl(url.to_string()));
        }
        self.pdf.to_html(url).await
    }

    /// Reference list of an article page
    pub async fn get_references(&self, article_url: &str) -> Result<ReferencesResult, ScrapeError> {
        if !is_http_url(article_url) {
            return Err(ScrapeError::InvalidUrl(article_url.to_string()));
        }
        let timeout = Duration::from_secs(self.config.fetch.request_timeout_secs);
        fetch_references(&self.http, article_url, timeout).await
    }

    /// Turkish summary of the article PDF at `url`
    pub async fn summarize_article(&self, url: &str) -> Result<String, ScrapeError> {
        let summarizer = self.summarizer.as_ref().ok_or_else(|| {
            ScrapeError::SummaryUnavailable("no summarization model configured".to_string())
        })?;

        let html = self.pdf_to_readable(url).await?;
        let prompt = summary_prompt(&html, summarizer.max_input_chars());
        summarizer.summarize(SUMMARY_SYSTEM_PROMPT, &prompt).await
    }

    /// Download URL of an article file on the configured portal
    pub fn pdf_url_for_file_id(&self, file_id: u64) -> String {
        crate::portal::pdf_url_for_file_id(&self.config.portal.base_url, file_id)
    }

    /// Close every browser instance
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down DergiPark service");
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBrowserEngine, MockScript};

    async fn service() -> (DergiparkService, Arc<MockBrowserEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.browser.pool_size = 2;
        config.captcha.api_key = None;
        config.ocr.api_key = None;
        config.summary.api_key = None;
        config.cache.cookie_file = dir.path().join("cookies.json");

        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let service = DergiparkService::with_engine(config, engine.clone())
            .await
            .unwrap();
        (service, engine, dir)
    }

    #[tokio::test]
    async fn test_init_launches_pool_and_shutdown_closes_it() {
        let (service, engine, _dir) = service().await;
        assert_eq!(engine.launch_count(), 2);

        service.shutdown().await;
        assert_eq!(engine.instances_closed(), 2);
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected() {
        let (service, _engine, _dir) = service().await;

        assert!(matches!(
            service.pdf_to_readable("article-file/1").await,
            Err(ScrapeError::InvalidUrl(_))
        ));
        assert!(matches!(
            service.get_references("mailto:a@b.c").await,
            Err(ScrapeError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_needs_a_model() {
        let (service, _engine, _dir) = service().await;

        let err = service
            .summarize_article("https://dergipark.org.tr/tr/download/article-file/1")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SummaryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_pdf_url_for_file_id_uses_portal() {
        let (service, _engine, _dir) = service().await;
        assert_eq!(
            service.pdf_url_for_file_id(118146),
            "https://dergipark.org.tr/tr/download/article-file/118146"
        );
    }

    #[tokio::test]
    async fn test_launch_failure_is_resource_exhausted() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        engine.fail_launches(true);

        let err = DergiparkService::with_engine(Config::default(), engine)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScrapeError::ResourceExhausted(_)));
    }
}
