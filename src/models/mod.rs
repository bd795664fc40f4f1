//! Core data models for search queries, articles, cookies and documents.

mod article;
mod captcha;
mod cookie;
mod pdf;
mod query;

pub use article::{ArticleDetail, LinkRecord, Pagination, ReferencesResult, SearchResponse};
pub use captcha::{CaptchaTask, ChallengeKind, TaskStatus, TURNSTILE_KEY_PREFIX};
pub use cookie::{SameSite, SessionCookie, SessionCookieSet};
pub use pdf::{ExtractionMethod, PdfDocument};
pub use query::{IndexFilter, LinksCacheKey, SearchField, SearchQuery, SortOrder};
