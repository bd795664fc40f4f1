//! Configuration management.
//!
//! Every section has serde defaults so a partial TOML file (or none at all) is
//! enough. Values can be overridden with `DERGIPARK_<SECTION>__<KEY>` environment
//! variables, e.g. `DERGIPARK_BROWSER__POOL_SIZE=2`.
//!
//! ```toml
//! [browser]
//! pool_size = 5
//! headless = true
//!
//! [captcha]
//! poll_interval_secs = 6
//! timeout_secs = 180
//!
//! [cache]
//! links_ttl_secs = 600
//! cookie_file = "/data/cookies_persistent.json"
//!
//! [fetch]
//! max_concurrent = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target portal settings
    #[serde(default)]
    pub portal: PortalConfig,

    /// Browser pool settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// CAPTCHA solving service settings
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Cache TTLs and the durable cookie file
    #[serde(default)]
    pub cache: CacheConfig,

    /// Article detail fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// PDF download and extraction
    #[serde(default)]
    pub pdf: PdfConfig,

    /// OCR fallback service
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Article summarization model
    #[serde(default)]
    pub summary: SummaryConfig,
}

/// Target portal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Site origin, used to absolutize relative links
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the search page
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Articles returned per API page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            page_size: default_page_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://dergipark.org.tr".to_string()
}

fn default_search_path() -> String {
    "/tr/search".to_string()
}

fn default_page_size() -> usize {
    24
}

/// Browser pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Number of browser instances launched at startup
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Run browsers without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable (falls back to `CHROME_EXECUTABLE` and PATH lookup)
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Timeout for a single navigation
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// How long to wait for result cards to render
    #[serde(default = "default_results_wait")]
    pub results_wait_secs: u64,

    /// Locale for new browsing contexts
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Viewport width for new browsing contexts
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    /// Viewport height for new browsing contexts
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// User agents picked at random per browsing context
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            headless: true,
            chrome_executable: None,
            navigation_timeout_secs: default_navigation_timeout(),
            results_wait_secs: default_results_wait(),
            locale: default_locale(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agents: default_user_agents(),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn results_wait(&self) -> Duration {
        Duration::from_secs(self.results_wait_secs)
    }
}

fn default_pool_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    40
}

fn default_results_wait() -> u64 {
    10
}

fn default_locale() -> String {
    "tr-TR".to_string()
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
    ]
}

/// CAPTCHA solving service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Solving service client key
    #[serde(default = "env_capsolver_key")]
    pub api_key: Option<String>,

    /// Task creation endpoint
    #[serde(default = "default_create_task_url")]
    pub create_task_url: String,

    /// Task result endpoint
    #[serde(default = "default_get_result_url")]
    pub get_result_url: String,

    /// Delay between result polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Overall polling budget
    #[serde(default = "default_captcha_timeout")]
    pub timeout_secs: u64,

    /// Poll transport errors tolerated before giving up
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Wait before trying the submit button without a token
    #[serde(default = "default_passive_wait")]
    pub passive_wait_secs: u64,

    /// Pause after token injection so the widget can react
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,

    /// Timeout for the navigation triggered by submit
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// Timeout for each request to the solving service
    #[serde(default = "default_service_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            api_key: env_capsolver_key(),
            create_task_url: default_create_task_url(),
            get_result_url: default_get_result_url(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_captcha_timeout(),
            max_poll_failures: default_max_poll_failures(),
            passive_wait_secs: default_passive_wait(),
            settle_millis: default_settle_millis(),
            submit_timeout_secs: default_submit_timeout(),
            request_timeout_secs: default_service_timeout(),
        }
    }
}

fn env_capsolver_key() -> Option<String> {
    std::env::var("CAPSOLVER_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn default_create_task_url() -> String {
    "https://api.capsolver.com/createTask".to_string()
}

fn default_get_result_url() -> String {
    "https://api.capsolver.com/getTaskResult".to_string()
}

fn default_poll_interval() -> u64 {
    6
}

fn default_captcha_timeout() -> u64 {
    180
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_passive_wait() -> u64 {
    5
}

fn default_settle_millis() -> u64 {
    1500
}

fn default_submit_timeout() -> u64 {
    35
}

fn default_service_timeout() -> u64 {
    20
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for scraped link lists
    #[serde(default = "default_links_ttl")]
    pub links_ttl_secs: u64,

    /// Maximum number of cached link lists
    #[serde(default = "default_links_max")]
    pub links_max_entries: usize,

    /// TTL for authenticated session cookies
    #[serde(default = "default_cookies_ttl")]
    pub cookies_ttl_secs: u64,

    /// Durable cookie file (one per process/volume)
    #[serde(default = "default_cookie_file")]
    pub cookie_file: PathBuf,

    /// TTL for converted PDF documents
    #[serde(default = "default_pdf_ttl")]
    pub pdf_ttl_secs: u64,

    /// Maximum number of cached PDF documents
    #[serde(default = "default_pdf_max")]
    pub pdf_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            links_ttl_secs: default_links_ttl(),
            links_max_entries: default_links_max(),
            cookies_ttl_secs: default_cookies_ttl(),
            cookie_file: default_cookie_file(),
            pdf_ttl_secs: default_pdf_ttl(),
            pdf_max_entries: default_pdf_max(),
        }
    }
}

fn default_links_ttl() -> u64 {
    600
}

fn default_links_max() -> usize {
    100
}

fn default_cookies_ttl() -> u64 {
    1800
}

fn default_pdf_ttl() -> u64 {
    std::env::var("PDF_CACHE_TTL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(86_400)
}

fn default_pdf_max() -> usize {
    500
}

/// Default location of the durable cookie file
pub fn default_cookie_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("dergipark-mcp"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cookies_persistent.json")
}

/// Article detail fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Detail pages fetched simultaneously
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Timeout for a detail page request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a journal index page request
    #[serde(default = "default_index_timeout")]
    pub index_timeout_secs: u64,

    /// Attempts per detail page (first try included)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Linear backoff step between attempts
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_millis: u64,

    /// Abstracts are cut to this many words
    #[serde(default = "default_abstract_words")]
    pub abstract_word_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
            index_timeout_secs: default_index_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_millis: default_retry_backoff(),
            abstract_word_limit: default_abstract_words(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_index_timeout() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    1500
}

fn default_abstract_words() -> usize {
    100
}

/// PDF download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Total download timeout
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Connect timeout for downloads
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Below this many characters the local extractor output is considered a scan
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: default_download_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_download_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_min_text_chars() -> usize {
    100
}

/// OCR service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// OCR service API key; OCR is disabled when absent
    #[serde(default = "env_mistral_key")]
    pub api_key: Option<String>,

    /// OCR endpoint
    #[serde(default = "default_ocr_endpoint")]
    pub endpoint: String,

    /// OCR model name
    #[serde(default = "default_ocr_model")]
    pub model: String,

    /// Timeout for one OCR request
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: env_mistral_key(),
            endpoint: default_ocr_endpoint(),
            model: default_ocr_model(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

fn env_mistral_key() -> Option<String> {
    std::env::var("MISTRAL_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn default_ocr_endpoint() -> String {
    "https://api.mistral.ai/v1/ocr".to_string()
}

fn default_ocr_model() -> String {
    "mistral-ocr-latest".to_string()
}

fn default_ocr_timeout() -> u64 {
    120
}

/// Chat-completion model used by `summarize_article`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// API key; summarization is disabled when absent
    #[serde(default = "env_mistral_key")]
    pub api_key: Option<String>,

    /// Chat completions endpoint
    #[serde(default = "default_summary_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_summary_model")]
    pub model: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,

    /// Article text beyond this many characters is cut before prompting
    #[serde(default = "default_summary_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: env_mistral_key(),
            endpoint: default_summary_endpoint(),
            model: default_summary_model(),
            max_tokens: default_summary_max_tokens(),
            max_input_chars: default_summary_max_input_chars(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

fn default_summary_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}

fn default_summary_model() -> String {
    "mistral-small-latest".to_string()
}

fn default_summary_max_tokens() -> u32 {
    1000
}

fn default_summary_max_input_chars() -> usize {
    120_000
}

/// Load configuration from a file, with `DERGIPARK_` environment overrides
pub fn load_config(path: &PathBuf) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(
            config::Environment::with_prefix("DERGIPARK")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

/// Get the default configuration (from env vars or defaults)
pub fn get_config() -> Config {
    Config::default()
}

/// Look for a config file in the working directory, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("dergipark.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("dergipark-mcp").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Render a configuration as TOML (used by `dergipark-mcp config`)
pub fn to_toml(config: &Config) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.browser.pool_size, 5);
        assert_eq!(config.fetch.max_concurrent, 3);
        assert_eq!(config.portal.page_size, 24);
        assert_eq!(config.captcha.poll_interval_secs, 6);
        assert_eq!(config.captcha.timeout_secs, 180);
        assert_eq!(config.cache.links_ttl_secs, 600);
        assert_eq!(config.cache.cookies_ttl_secs, 1800);
        assert_eq!(config.pdf.min_text_chars, 100);
        assert_eq!(config.browser.user_agents.len(), 4);
        assert_eq!(config.summary.max_tokens, 1000);
    }

    #[test]
    fn test_load_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dergipark.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"
[browser]
pool_size = 2
headless = false

[fetch]
max_concurrent = 6
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.browser.pool_size, 2);
        assert!(!config.browser.headless);
        assert_eq!(config.fetch.max_concurrent, 6);
        // untouched sections keep their defaults
        assert_eq!(config.portal.base_url, "https://dergipark.org.tr");
        assert_eq!(config.fetch.abstract_word_limit, 100);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let rendered = to_toml(&config).unwrap();
        assert!(rendered.contains("[browser]"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.browser.pool_size, config.browser.pool_size);
    }

    #[test]
    fn test_missing_config_file_errors() {
        let path = PathBuf::from("/nonexistent/dergipark.toml");
        assert!(load_config(&path).is_err());
    }
}
