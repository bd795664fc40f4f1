//! # DergiPark MCP
//!
//! A library and Model Context Protocol (MCP) server for searching Turkish academic
//! journals on DergiPark, extracting article metadata and turning article PDFs into
//! readable text.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (SearchQuery, LinkRecord, ArticleDetail, etc.)
//! - [`browser`]: Browser pool and the [`browser::PageDriver`] capability used for live scraping
//! - [`captcha`]: Verification page detection and solving-service client
//! - [`cache`]: TTL caches and the two-tier session cookie store
//! - [`portal`]: Portal-specific selectors, meta-tag parsing and concurrent detail fetching
//! - [`pdf`]: PDF download, text extraction and OCR fallback
//! - [`search`]: The search orchestrator tying everything together
//! - [`summary`]: Turkish article summaries through a chat-completion model
//! - [`service`]: Lifecycle-managed facade exposing the public operations
//! - [`mcp`]: MCP protocol server
//! - [`utils`]: HTTP client, retry combinator and text helpers
//! - [`config`]: Configuration management

pub mod browser;
pub mod cache;
pub mod captcha;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod pdf;
pub mod portal;
pub mod search;
pub mod service;
pub mod summary;
pub mod utils;

// Re-export commonly used types
pub use error::ScrapeError;
pub use models::{ArticleDetail, IndexFilter, LinkRecord, SearchQuery, SearchResponse};
pub use service::DergiparkService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
