//! Bounded-concurrency article detail fetching.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{is_blocked, parse_indices, PageMeta};
use crate::config::FetchConfig;
use crate::error::ScrapeError;
use crate::models::{ArticleDetail, IndexFilter, LinkRecord};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// Something that can GET an HTML page
#[async_trait]
pub trait HtmlSource: Send + Sync {
    async fn fetch_html(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ScrapeError>;
}

#[async_trait]
impl HtmlSource for HttpClient {
    async fn fetch_html(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ScrapeError> {
        self.get_text(url, referer, timeout).await
    }
}

/// Fetches and parses article detail pages, a few at a time
pub struct DetailFetcher {
    source: Arc<dyn HtmlSource>,
    config: FetchConfig,
    base_url: String,
}

impl DetailFetcher {
    pub fn new(source: Arc<dyn HtmlSource>, config: FetchConfig, base_url: impl Into<String>) -> Self {
        Self {
            source,
            config,
            base_url: base_url.into(),
        }
    }

    /// Fetch details for every link.
    ///
    /// Failures become entries with `error` set and never abort the batch.
    /// The index filter applies to every entry, so a failed entry (empty
    /// indices) survives only under [`IndexFilter::All`]. Input order is kept.
    pub async fn fetch_all(
        &self,
        links: &[LinkRecord],
        referer: &str,
        filter: IndexFilter,
    ) -> Vec<ArticleDetail> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        tracing::info!(
            "Fetching {} article details (max_concurrent={})",
            links.len(),
            self.config.max_concurrent
        );

        let tasks = links.iter().map(|link| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return ArticleDetail::failed(link, e.to_string()),
                };
                self.fetch_one(link, referer).await
            }
        });

        let details = join_all(tasks).await;

        details
            .into_iter()
            .filter(|detail| {
                let keep = filter.accepts(&detail.indices);
                if !keep {
                    tracing::debug!("Filtered out by index filter: {}", detail.url);
                }
                keep
            })
            .collect()
    }

    /// Fetch one article, turning any failure into an inline error
    pub async fn fetch_one(&self, link: &LinkRecord, referer: &str) -> ArticleDetail {
        let retry = RetryConfig::linear(
            self.config.retry_attempts,
            Duration::from_millis(self.config.retry_backoff_millis),
        );

        let result = with_retry(retry, || self.fetch_meta(link, referer)).await;

        match result {
            Ok(meta) => {
                let mut detail = meta.to_detail(link, &self.base_url, self.config.abstract_word_limit);
                detail.indices = self.fetch_indices(&meta).await;
                detail
            }
            Err(e) => {
                tracing::warn!("Detail fetch failed for {}: {}", link.url, e);
                ArticleDetail::failed(link, e.to_string())
            }
        }
    }

    async fn fetch_meta(&self, link: &LinkRecord, referer: &str) -> Result<PageMeta, ScrapeError> {
        tracing::debug!("Fetching detail page: {}", link.url);
        let html = self
            .source
            .fetch_html(
                &link.url,
                Some(referer),
                Duration::from_secs(self.config.request_timeout_secs),
            )
            .await?;

        if is_blocked(&html) {
            return Err(ScrapeError::Blocked);
        }

        let meta = PageMeta::parse(&html);
        if !meta.has_article_meta() {
            return Err(ScrapeError::ExtractionFailed(format!(
                "no article meta tags on {}",
                link.url
            )));
        }
        Ok(meta)
    }

    /// Journal indices, or an empty string when they cannot be fetched
    async fn fetch_indices(&self, meta: &PageMeta) -> String {
        let Some(url) = meta.indexes_url() else {
            return String::new();
        };

        match self
            .source
            .fetch_html(&url, None, Duration::from_secs(self.config.index_timeout_secs))
            .await
        {
            Ok(html) => parse_indices(&html),
            Err(e) => {
                tracing::debug!("Index fetch failed for {}: {}", url, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn article_html(title: &str, journal: &str) -> String {
        format!(
            r#"<html><head>
            <meta name="citation_title" content="{title}">
            <meta name="DC.Source.URI" content="https://dergipark.org.tr/tr/pub/{journal}">
            </head></html>"#
        )
    }

    fn index_html(names: &[&str]) -> String {
        names
            .iter()
            .map(|n| format!(r#"<h5 class="j-index-listing-index-title">{}</h5>"#, n))
            .collect()
    }

    /// In-memory source with per-URL bodies, optional delay and in-flight tracking
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Result<String, String>>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), Ok(body.into()));
            self
        }

        fn failing(mut self, url: &str) -> Self {
            self.pages.insert(url.to_string(), Err("connection reset".to_string()));
            self
        }
    }

    #[async_trait]
    impl HtmlSource for FakeSource {
        async fn fetch_html(
            &self,
            url: &str,
            _referer: Option<&str>,
            _timeout: Duration,
        ) -> Result<String, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(msg)) => Err(ScrapeError::Network(msg.clone())),
                None => Err(ScrapeError::Network(format!("HTTP 404 for {}", url))),
            }
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            retry_backoff_millis: 1,
            ..Default::default()
        }
    }

    fn link(n: usize) -> LinkRecord {
        LinkRecord::new(format!("https://dergipark.org.tr/a/{}", n), format!("A{}", n))
    }

    #[tokio::test]
    async fn test_blocked_page_is_inline_error() {
        let source = FakeSource::default().page(
            "https://dergipark.org.tr/a/0",
            "<html><title>Just a moment...</title>cloudflare</html>",
        );
        let fetcher = DetailFetcher::new(Arc::new(source), fast_config(), "https://dergipark.org.tr");

        let details = fetcher
            .fetch_all(&[link(0)], "https://dergipark.org.tr/tr/search", IndexFilter::All)
            .await;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].error.as_deref(), Some("Blocked"));
        assert!(details[0].citation_title.is_none());
    }

    #[tokio::test]
    async fn test_missing_meta_retried_then_extraction_failed() {
        let source = Arc::new(
            FakeSource::default().page("https://dergipark.org.tr/a/0", "<html><body>empty</body></html>"),
        );
        let fetcher = DetailFetcher::new(source.clone(), fast_config(), "https://dergipark.org.tr");

        let detail = fetcher.fetch_one(&link(0), "https://ref").await;
        assert!(detail.error.unwrap().starts_with("Extraction failed"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_indices_and_filter() {
        let source = FakeSource::default()
            .page("https://dergipark.org.tr/a/0", article_html("Zero", "tr"))
            .page("https://dergipark.org.tr/tr/pub/tr/indexes", index_html(&["TR Dizin", "EBSCO"]))
            .page("https://dergipark.org.tr/a/1", article_html("One", "other"))
            .page("https://dergipark.org.tr/tr/pub/other/indexes", index_html(&["EBSCO"]))
            .page("https://dergipark.org.tr/a/2", article_html("Two", "none"));
        let fetcher = DetailFetcher::new(Arc::new(source), fast_config(), "https://dergipark.org.tr");
        let links = vec![link(0), link(1), link(2)];

        let all = fetcher.fetch_all(&links, "https://ref", IndexFilter::All).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].indices, "TR Dizin, EBSCO");
        assert_eq!(all[2].indices, "");

        let tr_only = fetcher.fetch_all(&links, "https://ref", IndexFilter::TrIndexOnly).await;
        assert_eq!(tr_only.len(), 1);
        assert_eq!(tr_only[0].title, "A0");

        let non_empty = fetcher.fetch_all(&links, "https://ref", IndexFilter::NonEmpty).await;
        let titles: Vec<_> = non_empty.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["A0", "A1"]);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let mut source = FakeSource {
            delay: Duration::from_millis(40),
            ..Default::default()
        };
        for n in 0..10 {
            source = source.page(&format!("https://dergipark.org.tr/a/{}", n), article_html("T", "j"));
        }
        let source = Arc::new(source);
        let fetcher = DetailFetcher::new(source.clone(), fast_config(), "https://dergipark.org.tr");
        let links: Vec<_> = (0..10).map(link).collect();

        let details = fetcher.fetch_all(&links, "https://ref", IndexFilter::All).await;
        assert_eq!(details.len(), 10);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        assert!(source.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_one_failure_isolated_and_order_kept() {
        let mut source = FakeSource::default();
        for n in 0..5 {
            let url = format!("https://dergipark.org.tr/a/{}", n);
            source = if n == 3 {
                source.failing(&url)
            } else {
                source.page(&url, article_html(&format!("T{}", n), "j"))
            };
        }
        let fetcher = DetailFetcher::new(Arc::new(source), fast_config(), "https://dergipark.org.tr");
        let links: Vec<_> = (0..5).map(link).collect();

        let details = fetcher.fetch_all(&links, "https://ref", IndexFilter::All).await;
        assert_eq!(details.len(), 5);
        let urls: Vec<_> = details.iter().map(|d| d.url.clone()).collect();
        let expected: Vec<_> = links.iter().map(|l| l.url.clone()).collect();
        assert_eq!(urls, expected);
        assert_eq!(details.iter().filter(|d| d.is_error()).count(), 1);
        assert!(details[3].is_error());
        assert_eq!(details[4].citation_title.as_deref(), Some("T4"));
    }

    #[tokio::test]
    async fn test_failed_entry_subject_to_index_filter() {
        let source = FakeSource::default()
            .page("https://dergipark.org.tr/a/0", article_html("Zero", "tr"))
            .page("https://dergipark.org.tr/tr/pub/tr/indexes", index_html(&["TR Dizin"]))
            .failing("https://dergipark.org.tr/a/1");
        let fetcher = DetailFetcher::new(Arc::new(source), fast_config(), "https://dergipark.org.tr");
        let links = vec![link(0), link(1)];

        let all = fetcher.fetch_all(&links, "https://ref", IndexFilter::All).await;
        assert_eq!(all.len(), 2);
        assert!(all[1].is_error());

        for filter in [IndexFilter::TrIndexOnly, IndexFilter::NonEmpty] {
            let kept = fetcher.fetch_all(&links, "https://ref", filter).await;
            assert_eq!(kept.len(), 1, "{:?}", filter);
            assert_eq!(kept[0].title, "A0");
            assert!(!kept[0].is_error());
        }
    }
}
