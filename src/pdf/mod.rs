//! PDF download, text extraction and conversion to a readable HTML page.
//!
//! Text comes from the local extractor first. When that yields fewer than
//! `min_text_chars` characters (typically a scan) the remote OCR service is
//! asked once. Converted pages are cached by source URL.

mod extract;
mod ocr;
mod viewer;

pub use extract::{PdfExtractText, TextExtractor};
pub use ocr::{MistralOcr, OcrService};
pub use viewer::render_viewer;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, PdfCache};
use crate::config::PdfConfig;
use crate::error::ScrapeError;
use crate::models::{ExtractionMethod, PdfDocument};
use crate::utils::{is_http_url, HttpClient, DEFAULT_USER_AGENT};

/// Shown when neither extraction stage produced usable text
pub const PLACEHOLDER_TEXT: &str = "PDF içeriği okunamadı veya boş.";

/// Downloads PDFs and turns them into viewer HTML
pub struct PdfExtractionPipeline {
    http: HttpClient,
    cache: Arc<PdfCache>,
    extractor: Arc<dyn TextExtractor>,
    ocr: Option<Arc<dyn OcrService>>,
    min_text_chars: usize,
}

impl PdfExtractionPipeline {
    pub fn new(
        config: &PdfConfig,
        cache: Arc<PdfCache>,
        ocr: Option<Arc<dyn OcrService>>,
    ) -> Result<Self, ScrapeError> {
        let http = HttpClient::with_timeouts(
            DEFAULT_USER_AGENT,
            Duration::from_secs(config.download_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )?;

        if ocr.is_none() {
            tracing::debug!("OCR fallback disabled");
        }

        Ok(Self {
            http,
            cache,
            extractor: Arc::new(PdfExtractText),
            ocr,
            min_text_chars: config.min_text_chars,
        })
    }

    /// Replace the local extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Viewer HTML for the PDF at `url`, served from cache when possible
    pub async fn to_html(&self, url: &str) -> Result<String, ScrapeError> {
        if !is_http_url(url) {
            return Err(ScrapeError::InvalidUrl(url.to_string()));
        }

        if let Some(html) = self.cache.get(&url.to_string()) {
            tracing::debug!("PDF cache hit: {}", url);
            return Ok(html);
        }
        tracing::debug!("PDF cache miss: {}", url);

        let document = self.convert(url).await?;
        let html = render_viewer(&document);
        self.cache.set(url.to_string(), html.clone());
        Ok(html)
    }

    /// Download and extract without touching the cache
    pub async fn convert(&self, url: &str) -> Result<PdfDocument, ScrapeError> {
        let body = self.download(url).await?;

        let primary = match self.extract_primary(body).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Local PDF extraction failed for {}: {}", url, e);
                String::new()
            }
        };

        let primary_len = primary.trim().chars().count();
        tracing::debug!("Local extraction produced {} characters", primary_len);

        let (extracted_text, extraction_method) = if primary_len >= self.min_text_chars {
            (primary, ExtractionMethod::Primary)
        } else {
            tracing::info!(
                "Local extraction too short ({} < {}), trying OCR",
                primary_len,
                self.min_text_chars
            );
            match self.run_ocr(url).await {
                Some(text) => (text, ExtractionMethod::Ocr),
                None => (PLACEHOLDER_TEXT.to_string(), ExtractionMethod::Unavailable),
            }
        };

        Ok(PdfDocument {
            source_url: url.to_string(),
            extracted_text,
            extraction_method,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        tracing::info!("Downloading PDF: {}", url);
        let download = self
            .http
            .get_bytes(url)
            .await
            .map_err(|e| ScrapeError::PdfDownloadFailed(format!("{}: {}", url, e)))?;

        let content_type = download.content_type.unwrap_or_default();
        if !content_type.contains("application/pdf") {
            tracing::warn!("Content type of {} is '{}', not application/pdf", url, content_type);
        }

        if download.body.is_empty() {
            return Err(ScrapeError::PdfDownloadFailed(format!("empty body from {}", url)));
        }
        Ok(download.body)
    }

    /// Write the body to a temporary `.pdf` and run the local extractor on the blocking pool
    async fn extract_primary(&self, body: Vec<u8>) -> Result<String, ScrapeError> {
        let extractor = Arc::clone(&self.extractor);

        tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("dergipark-")
                .suffix(".pdf")
                .tempfile()?;
            file.write_all(&body)?;
            file.flush()?;
            extractor.extract(file.path())
        })
        .await
        .map_err(|e| ScrapeError::ExtractionFailed(format!("extraction task: {}", e)))?
    }

    async fn run_ocr(&self, url: &str) -> Option<String> {
        let Some(ocr) = self.ocr.as_ref() else {
            tracing::info!("OCR not configured, using placeholder text");
            return None;
        };

        match ocr.recognize(url).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::warn!("OCR returned no text for {}", url);
                None
            }
            Err(e) => {
                tracing::warn!("OCR failed for {}: {}", url, e);
                None
            }
        }
    }
}
