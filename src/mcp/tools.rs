//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::handlers::{
    GetArticleReferencesHandler, PdfToHtmlHandler, SearchArticlesHandler, SummarizeArticleHandler,
};
use crate::service::DergiparkService;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_articles")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a registry with the DergiPark tools bound to `service`
    pub fn from_service(service: Arc<DergiparkService>) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        registry.register(Tool {
            name: "search_articles".to_string(),
            description: "Search Turkish academic journals on DergiPark. Returns paginated results \
                (24 articles per page) with title, authors, abstract, keywords, DOI, indexes and PDF link."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (e.g., 'yapay zeka'). Leave empty to search all articles."
                    },
                    "fields": {
                        "type": "object",
                        "description": "Field-qualified terms, e.g. {\"author\": \"Yılmaz\", \"journal\": \"bilig\"}. Overrides 'query'.",
                        "additionalProperties": { "type": "string" }
                    },
                    "dergipark_page": {
                        "type": "integer",
                        "description": "DergiPark result page number",
                        "minimum": 1,
                        "default": 1
                    },
                    "page": {
                        "type": "integer",
                        "description": "Output page over the scraped results (24 articles per page)",
                        "minimum": 1,
                        "default": 1
                    },
                    "sort": {
                        "type": "string",
                        "enum": ["newest", "oldest"],
                        "description": "Sort order"
                    },
                    "article_type": {
                        "type": "string",
                        "description": "Article type code (e.g., '54' = Research Article)"
                    },
                    "year": {
                        "type": "string",
                        "description": "Publication year filter (e.g., '2024')"
                    },
                    "index_filter": {
                        "type": "string",
                        "enum": ["hepsi", "tr_dizin_icerenler", "bos_olmayanlar"],
                        "description": "'tr_dizin_icerenler' (TR Dizin only), 'bos_olmayanlar' (any index), 'hepsi' (all)",
                        "default": "hepsi"
                    }
                }
            }),
            handler: Arc::new(SearchArticlesHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "pdf_to_html".to_string(),
            description: "Convert a DergiPark article PDF to a readable HTML page. Pass either the numeric \
                file id (e.g., '118146') or a full PDF URL."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pdf_id": {
                        "type": "string",
                        "description": "DergiPark article file id (e.g., '118146')"
                    },
                    "pdf_url": {
                        "type": "string",
                        "description": "Absolute PDF URL, used when pdf_id is not given"
                    }
                }
            }),
            handler: Arc::new(PdfToHtmlHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "get_article_references".to_string(),
            description: "Get the reference list of a DergiPark article. Use after search_articles."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "article_url": {
                        "type": "string",
                        "description": "DergiPark article URL (e.g., 'https://dergipark.org.tr/en/pub/eskiyeni/article/434507')"
                    }
                },
                "required": ["article_url"]
            }),
            handler: Arc::new(GetArticleReferencesHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "summarize_article".to_string(),
            description: "Summarize a DergiPark article in Turkish. Converts the PDF to text and asks a \
                language model for a short summary. Requires MISTRAL_API_KEY."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pdf_id": {
                        "type": "string",
                        "description": "DergiPark article file id (e.g., '118146')"
                    },
                    "pdf_url": {
                        "type": "string",
                        "description": "Absolute PDF URL, used when pdf_id is not given"
                    }
                }
            }),
            handler: Arc::new(SummarizeArticleHandler { service }),
        });

        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools
    pub fn all(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}
