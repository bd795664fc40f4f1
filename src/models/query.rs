//! Search query model, remote URL construction and cache key derivation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field qualifiers understood by the portal's search box (`field:value`).
///
/// Declaration order is the order tokens appear in the remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    RunningTitle,
    Journal,
    Issn,
    Eissn,
    Abstract,
    Keywords,
    Doi,
    DoiUrl,
    DoiPrefix,
    Author,
    Orcid,
    Institution,
    Translator,
    Pubyear,
    Citation,
}

impl SearchField {
    /// Name used in the remote query string
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Title => "title",
            SearchField::RunningTitle => "running_title",
            SearchField::Journal => "journal",
            SearchField::Issn => "issn",
            SearchField::Eissn => "eissn",
            SearchField::Abstract => "abstract",
            SearchField::Keywords => "keywords",
            SearchField::Doi => "doi",
            SearchField::DoiUrl => "doi_url",
            SearchField::DoiPrefix => "doi_prefix",
            SearchField::Author => "author",
            SearchField::Orcid => "orcid",
            SearchField::Institution => "institution",
            SearchField::Translator => "translator",
            SearchField::Pubyear => "pubyear",
            SearchField::Citation => "citation",
        }
    }

    /// Parse a field name as accepted by the CLI and tool arguments
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name.trim().to_lowercase().as_str() {
            "title" => SearchField::Title,
            "running_title" => SearchField::RunningTitle,
            "journal" => SearchField::Journal,
            "issn" => SearchField::Issn,
            "eissn" => SearchField::Eissn,
            "abstract" => SearchField::Abstract,
            "keywords" => SearchField::Keywords,
            "doi" => SearchField::Doi,
            "doi_url" => SearchField::DoiUrl,
            "doi_prefix" => SearchField::DoiPrefix,
            "author" => SearchField::Author,
            "orcid" => SearchField::Orcid,
            "institution" => SearchField::Institution,
            "translator" => SearchField::Translator,
            "pubyear" | "year" => SearchField::Pubyear,
            "citation" => SearchField::Citation,
            _ => return None,
        };
        Some(field)
    }
}

/// Sort order offered by the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            other => Err(format!("Unknown sort order: {}", other)),
        }
    }
}

/// Index-membership filter applied after detail extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFilter {
    /// Keep every article
    #[default]
    All,
    /// Keep articles whose journal is indexed in TR Dizin
    TrIndexOnly,
    /// Keep articles whose journal lists at least one index
    NonEmpty,
}

impl IndexFilter {
    /// Whether an article with the given joined index string passes
    pub fn accepts(&self, indices: &str) -> bool {
        match self {
            IndexFilter::All => true,
            IndexFilter::TrIndexOnly => indices.contains("TR Dizin"),
            IndexFilter::NonEmpty => !indices.is_empty(),
        }
    }
}

impl std::str::FromStr for IndexFilter {
    type Err = String;

    /// Accepts the English names as well as the portal's Turkish labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "hepsi" => Ok(IndexFilter::All),
            "tr_index_only" | "tr_dizin_icerenler" => Ok(IndexFilter::TrIndexOnly),
            "non_empty" | "bos_olmayanlar" => Ok(IndexFilter::NonEmpty),
            other => Err(format!("Unknown index filter: {}", other)),
        }
    }
}

/// A search request.
///
/// `result_page` addresses the portal's own paging, `output_page` slices the
/// scraped link list into pages of the configured size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query; ignored when field terms are present
    #[serde(default)]
    pub text: Option<String>,

    /// Field-qualified terms
    #[serde(default)]
    pub fields: BTreeMap<SearchField, String>,

    /// Page on the portal (1-based)
    #[serde(default = "first_page")]
    pub result_page: u32,

    /// Page of the sliced output (1-based)
    #[serde(default = "first_page")]
    pub output_page: u32,

    #[serde(default)]
    pub sort: Option<SortOrder>,

    /// Portal article-type code (e.g. "54" for research articles)
    #[serde(default)]
    pub article_type: Option<String>,

    #[serde(default)]
    pub publication_year: Option<String>,

    #[serde(default)]
    pub index_filter: IndexFilter,
}

fn first_page() -> u32 {
    1
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            fields: BTreeMap::new(),
            result_page: 1,
            output_page: 1,
            sort: None,
            article_type: None,
            publication_year: None,
            index_filter: IndexFilter::All,
        }
    }
}

impl SearchQuery {
    /// Create a free-text query
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            text: if text.trim().is_empty() { None } else { Some(text) },
            ..Default::default()
        }
    }

    /// Add a field-qualified term
    pub fn field(mut self, field: SearchField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn result_page(mut self, page: u32) -> Self {
        self.result_page = page.max(1);
        self
    }

    pub fn output_page(mut self, page: u32) -> Self {
        self.output_page = page.max(1);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn article_type(mut self, code: impl Into<String>) -> Self {
        self.article_type = Some(code.into());
        self
    }

    pub fn publication_year(mut self, year: impl Into<String>) -> Self {
        self.publication_year = Some(year.into());
        self
    }

    pub fn index_filter(mut self, filter: IndexFilter) -> Self {
        self.index_filter = filter;
        self
    }

    /// The value of the portal's `q` parameter
    pub fn query_text(&self) -> String {
        if !self.fields.is_empty() {
            return self
                .fields
                .iter()
                .map(|(field, value)| format!("{}:{}", field.as_str(), value.trim()))
                .collect::<Vec<_>>()
                .join(" ");
        }

        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => "*".to_string(),
        }
    }

    /// Build the deterministic remote search URL
    pub fn build_search_url(&self, base_url: &str, search_path: &str) -> String {
        let mut params: Vec<(&str, String)> = vec![
            ("q", self.query_text()),
            ("section", "article".to_string()),
        ];

        if self.result_page > 1 {
            params.push(("page", self.result_page.to_string()));
        }
        if let Some(code) = &self.article_type {
            params.push(("filter[article_type][]", code.clone()));
        }
        if let Some(sort) = self.sort {
            params.push(("sortBy", sort.as_str().to_string()));
        }
        if let Some(year) = &self.publication_year {
            params.push(("filter[publication_year][]", year.clone()));
        }

        let query = params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            search_path,
            query
        )
    }

    /// Cache key for the scraped link list.
    ///
    /// Every field except `output_page` feeds the digest, including the index
    /// filter even though it only applies after detail extraction.
    pub fn links_cache_key(&self) -> LinksCacheKey {
        let mut canonical: BTreeMap<&str, String> = BTreeMap::new();
        canonical.insert("q", self.query_text());
        canonical.insert("result_page", self.result_page.to_string());
        canonical.insert(
            "sort",
            self.sort.map(|s| s.as_str().to_string()).unwrap_or_default(),
        );
        canonical.insert("article_type", self.article_type.clone().unwrap_or_default());
        canonical.insert(
            "publication_year",
            self.publication_year.clone().unwrap_or_default(),
        );
        canonical.insert("index_filter", format!("{:?}", self.index_filter));

        let flat = canonical
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("|");

        LinksCacheKey {
            digest: format!("{:x}", md5::compute(flat.as_bytes())),
            result_page: self.result_page,
        }
    }
}

/// Key of a cached link list: query digest plus the portal result page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinksCacheKey {
    pub digest: String,
    pub result_page: u32,
}

impl fmt::Display for LinksCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest, self.result_page)
    }
}
