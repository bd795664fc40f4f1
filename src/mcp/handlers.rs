//! Tool handlers for the DergiPark operations.
//!
//! Operation failures are returned as `{"error": ...}` payloads rather than
//! protocol errors; only malformed arguments fail the call itself.

use std::sync::Arc;

use serde_json::{json, Value};

use super::tools::ToolHandler;
use crate::models::{IndexFilter, SearchField, SearchQuery, SortOrder};
use crate::service::DergiparkService;

/// Build a [`SearchQuery`] from `search_articles` arguments
pub fn parse_search_args(args: &Value) -> Result<SearchQuery, String> {
    let text = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
    let mut query = SearchQuery::new(text);

    if let Some(fields) = args.get("fields").and_then(|v| v.as_object()) {
        for (name, value) in fields {
            let field = SearchField::parse(name)
                .ok_or_else(|| format!("Unknown search field '{}'", name))?;
            let value = value
                .as_str()
                .ok_or_else(|| format!("Field '{}' must be a string", name))?;
            if !value.trim().is_empty() {
                query = query.field(field, value);
            }
        }
    }

    if let Some(page) = args.get("dergipark_page").and_then(|v| v.as_u64()) {
        query = query.result_page(page.min(u32::MAX as u64) as u32);
    }
    if let Some(page) = args.get("page").and_then(|v| v.as_u64()) {
        query = query.output_page(page.min(u32::MAX as u64) as u32);
    }

    if let Some(sort) = args.get("sort").and_then(|v| v.as_str()) {
        query = query.sort(sort.parse::<SortOrder>()?);
    }
    if let Some(code) = args.get("article_type").and_then(|v| v.as_str()) {
        query = query.article_type(code);
    }
    if let Some(year) = args.get("year").and_then(|v| v.as_str()) {
        query = query.publication_year(year);
    }
    if let Some(filter) = args.get("index_filter").and_then(|v| v.as_str()) {
        query = query.index_filter(filter.parse::<IndexFilter>()?);
    }

    Ok(query)
}

/// Handler for `search_articles`
#[derive(Debug)]
pub struct SearchArticlesHandler {
    pub service: Arc<DergiparkService>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchArticlesHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = parse_search_args(&args)?;

        match self.service.search(&query).await {
            Ok(response) => serde_json::to_value(response).map_err(|e| e.to_string()),
            Err(e) => {
                tracing::warn!("search_articles failed: {}", e);
                Ok(json!({
                    "error": format!("Search error: {}", e),
                    "pagination": null,
                    "articles": [],
                }))
            }
        }
    }
}

/// Handler for `pdf_to_html`
#[derive(Debug)]
pub struct PdfToHtmlHandler {
    pub service: Arc<DergiparkService>,
}

/// PDF URL from a `pdf_id` (string or number), else from `pdf_url`
fn resolve_pdf_url(service: &DergiparkService, args: &Value) -> Result<String, String> {
    let file_id = match args.get("pdf_id") {
        Some(Value::String(id)) => Some(
            id.trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid 'pdf_id': {}", id))?,
        ),
        Some(Value::Number(id)) => Some(id.as_u64().ok_or("Invalid 'pdf_id'")?),
        _ => None,
    };

    if let Some(id) = file_id {
        return Ok(service.pdf_url_for_file_id(id));
    }

    args.get("pdf_url")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| "Missing 'pdf_id' or 'pdf_url' parameter".to_string())
}

#[async_trait::async_trait]
impl ToolHandler for PdfToHtmlHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let url = resolve_pdf_url(&self.service, &args)?;

        match self.service.pdf_to_readable(&url).await {
            Ok(html) => Ok(Value::String(html)),
            Err(e) => {
                tracing::warn!("pdf_to_html failed for {}: {}", url, e);
                Ok(json!({ "error": format!("PDF conversion error: {}", e) }))
            }
        }
    }
}

/// Handler for `summarize_article`
#[derive(Debug)]
pub struct SummarizeArticleHandler {
    pub service: Arc<DergiparkService>,
}

#[async_trait::async_trait]
impl ToolHandler for SummarizeArticleHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let url = resolve_pdf_url(&self.service, &args)?;

        match self.service.summarize_article(&url).await {
            Ok(summary) => Ok(Value::String(summary)),
            Err(e) => {
                tracing::warn!("summarize_article failed for {}: {}", url, e);
                Ok(Value::String(format!("Error: Summarization error: {}", e)))
            }
        }
    }
}

/// Handler for `get_article_references`
#[derive(Debug)]
pub struct GetArticleReferencesHandler {
    pub service: Arc<DergiparkService>,
}

#[async_trait::async_trait]
impl ToolHandler for GetArticleReferencesHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let article_url = args
            .get("article_url")
            .and_then(|v| v.as_str())
            .ok_or("Missing 'article_url' parameter")?;

        match self.service.get_references(article_url).await {
            Ok(result) => serde_json::to_value(result).map_err(|e| e.to_string()),
            Err(e) => {
                tracing::warn!("get_article_references failed for {}: {}", article_url, e);
                Ok(json!({
                    "error": format!("References fetch error: {}", e),
                    "references": [],
                }))
            }
        }
    }
}
