//! Error taxonomy shared by every scraping component.

/// Errors that can occur while talking to the portal, the browser or the
/// third-party solving/OCR services.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// A bot-detection signature was found in a response body
    #[error("Blocked")]
    Blocked,

    /// A verification page was detected but could not be passed
    #[error("CAPTCHA solving failed: {0}")]
    CaptchaUnsolved(String),

    /// Navigation or request did not finish within its timeout
    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    /// The browser pool could not produce a usable handle
    #[error("Browser pool exhausted: {0}")]
    ResourceExhausted(String),

    /// A page was fetched but carried no usable metadata
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// PDF could not be downloaded
    #[error("PDF download failed: {0}")]
    PdfDownloadFailed(String),

    /// OCR service is not configured or did not respond usefully
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    /// Summarization model is not configured or gave no usable answer
    #[error("Summarization unavailable: {0}")]
    SummaryUnavailable(String),

    /// Caller supplied a URL that is not absolute HTTP(S)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Browser automation error
    #[error("Browser error: {0}")]
    Browser(String),

    /// Parsing error (JSON, HTML)
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl ScrapeError {
    /// Whether a bounded retry is worth attempting for this error.
    ///
    /// Timeouts, transport failures and pages that came back without
    /// metadata are retryable; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout(_)
                | ScrapeError::Network(_)
                | ScrapeError::ExtractionFailed(_)
        )
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::NavigationTimeout(err.to_string())
        } else {
            ScrapeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Parse(format!("JSON: {}", err))
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => {
                ScrapeError::NavigationTimeout("browser command timed out".to_string())
            }
            other => ScrapeError::Browser(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ScrapeError::NavigationTimeout("slow".to_string()).is_retryable());
        assert!(ScrapeError::Network("reset".to_string()).is_retryable());
        assert!(ScrapeError::ExtractionFailed("no meta".to_string()).is_retryable());

        assert!(!ScrapeError::Blocked.is_retryable());
        assert!(!ScrapeError::CaptchaUnsolved("no sitekey".to_string()).is_retryable());
        assert!(!ScrapeError::InvalidUrl("ftp://x".to_string()).is_retryable());
    }

    #[test]
    fn test_blocked_display() {
        assert_eq!(ScrapeError::Blocked.to_string(), "Blocked");
    }
}
