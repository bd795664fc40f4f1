//! Article link and detail models, plus the search response envelope.

use serde::{Deserialize, Serialize};

/// One article discovered on a results page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Absolute article URL
    pub url: String,
    pub title: String,
}

impl LinkRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Article metadata read from a detail page.
///
/// When `error` is set the metadata fields are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub url: String,

    /// Title from the results page
    pub title: String,

    /// `citation_title` meta, may differ from the card title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,

    /// Abstract cut to a fixed number of words
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<usize>,

    /// Journal indices joined with ", " (empty if unknown)
    #[serde(default)]
    pub indices: String,

    /// Absolute PDF URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    pub error: Option<String>,
}

impl ArticleDetail {
    /// A failed entry carrying only the link and the reason
    pub fn failed(link: &LinkRecord, reason: impl Into<String>) -> Self {
        Self {
            url: link.url.clone(),
            title: link.title.clone(),
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Output pagination over one portal result page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub api_page: u32,
    pub page_size: usize,
    pub total_items_on_result_page: usize,
    pub total_api_pages: usize,
}

impl Pagination {
    /// Compute pagination for `total` links split into pages of `page_size`
    pub fn new(api_page: u32, page_size: usize, total: usize) -> Self {
        let total_api_pages = if total == 0 || page_size == 0 {
            0
        } else {
            total.div_ceil(page_size)
        };

        Self {
            api_page,
            page_size,
            total_items_on_result_page: total,
            total_api_pages,
        }
    }

    /// Index range of the requested page, clamped to `total`
    pub fn slice_range(&self) -> std::ops::Range<usize> {
        let total = self.total_items_on_result_page;
        let start = (self.api_page.max(1) as usize - 1)
            .saturating_mul(self.page_size)
            .min(total);
        let end = start.saturating_add(self.page_size).min(total);
        start..end
    }
}

/// Result of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub pagination: Pagination,
    pub articles: Vec<ArticleDetail>,
}

impl SearchResponse {
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            pagination,
            articles: Vec::new(),
        }
    }
}

/// References listed on an article page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesResult {
    pub article_url: String,
    pub title: Option<String>,
    pub reference_count: usize,
    pub references: Vec<String>,
}
