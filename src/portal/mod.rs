//! DergiPark-specific knowledge: selectors, block signatures, meta-tag
//! parsing and article detail fetching.

mod fetcher;
mod links;
mod meta;
mod references;

pub use fetcher::{DetailFetcher, HtmlSource};
pub use links::{extract_links, parse_card};
pub use meta::{parse_indices, PageMeta};
pub use references::fetch_references;

/// Result card on the search page
pub const CARD_SELECTOR: &str = "div.card.article-card.dp-card-outline";

/// Title link inside a result card
pub const TITLE_LINK_SELECTOR: &str = "h5.card-title > a[href]";

/// Tab switching the search page to the article section
pub const SECTION_LINK_SELECTOR: &str = r#"a.search-section-link[href*="section=article"]"#;

/// Query marker of the article section
pub const ARTICLE_SECTION_PARAM: &str = "section=article";

/// Element carrying the challenge site key
pub const SITE_KEY_SELECTOR: &str = "[data-sitekey]";

/// Submit control of the verification form
pub const SUBMIT_SELECTOR: &str = r#"form[name="search_verification"] button[type="submit"]"#;

/// Path fragment of verification pages (covers `/search-verification`)
pub const VERIFICATION_MARKER: &str = "verification";

/// Index names on a journal's `/indexes` page
pub const INDEX_TITLE_SELECTOR: &str = "h5.j-index-listing-index-title";

/// Only cookies whose domain contains this are persisted
pub const COOKIE_DOMAIN_MARKER: &str = "dergipark";

/// Case-insensitive markers of a bot-detection page
pub const BLOCK_SIGNATURES: &[&str] = &["cloudflare", "captcha", "blocked", "erişim engellendi"];

/// Whether a URL points at a verification page
pub fn is_verification_url(url: &str) -> bool {
    url.contains(VERIFICATION_MARKER)
}

/// Whether a page body looks like a block page
pub fn is_blocked(body: &str) -> bool {
    crate::utils::contains_any_ignore_case(body, BLOCK_SIGNATURES)
}

/// Download URL of an article file by its numeric id
pub fn pdf_url_for_file_id(base_url: &str, file_id: u64) -> String {
    format!(
        "{}/tr/download/article-file/{}",
        base_url.trim_end_matches('/'),
        file_id
    )
}

/// Make a possibly relative portal URL absolute
pub fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match url::Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => format!("{}{}", base_url.trim_end_matches('/'), href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_url() {
        assert!(is_verification_url(
            "https://dergipark.org.tr/tr/search-verification?q=a"
        ));
        assert!(!is_verification_url(
            "https://dergipark.org.tr/tr/search?q=a&section=article"
        ));
    }

    #[test]
    fn test_block_detection() {
        assert!(is_blocked("<title>Attention Required! | Cloudflare</title>"));
        assert!(is_blocked("Please complete the CAPTCHA"));
        assert!(!is_blocked("<meta name=\"citation_title\" content=\"Makale\">"));
    }

    #[test]
    fn test_pdf_url_for_file_id() {
        assert_eq!(
            pdf_url_for_file_id("https://dergipark.org.tr/", 123456),
            "https://dergipark.org.tr/tr/download/article-file/123456"
        );
    }

    #[test]
    fn test_absolutize() {
        let base = "https://dergipark.org.tr";
        assert_eq!(
            absolutize(base, "/tr/download/article-file/1"),
            "https://dergipark.org.tr/tr/download/article-file/1"
        );
        assert_eq!(absolutize(base, "https://other.org/x"), "https://other.org/x");
    }
}
