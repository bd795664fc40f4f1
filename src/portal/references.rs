//! Reference list lookup for a single article.

use std::time::Duration;

use super::{is_blocked, HtmlSource, PageMeta};
use crate::error::ScrapeError;
use crate::models::ReferencesResult;

/// Fetch an article page and collect its `citation_reference` entries
pub async fn fetch_references(
    source: &dyn HtmlSource,
    article_url: &str,
    timeout: Duration,
) -> Result<ReferencesResult, ScrapeError> {
    let html = source.fetch_html(article_url, None, timeout).await?;
    if is_blocked(&html) {
        return Err(ScrapeError::Blocked);
    }

    let meta = PageMeta::parse(&html);
    let references = meta.references().to_vec();
    tracing::debug!("Found {} references on {}", references.len(), article_url);

    Ok(ReferencesResult {
        article_url: article_url.to_string(),
        title: meta.get("citation_title").map(str::to_string),
        reference_count: references.len(),
        references,
    })
}
