//! Article page meta tags and journal index listings.

use scraper::{Html, Selector};
use std::collections::HashMap;

use super::{absolutize, INDEX_TITLE_SELECTOR};
use crate::models::{ArticleDetail, LinkRecord};
use crate::utils::truncate_words;

#[derive(Debug, Clone, Copy)]
enum MetaField {
    CitationTitle,
    Author,
    JournalTitle,
    PublicationDate,
    Keywords,
    Doi,
    Issn,
}

impl MetaField {
    fn slot(self, detail: &mut ArticleDetail) -> &mut Option<String> {
        match self {
            MetaField::CitationTitle => &mut detail.citation_title,
            MetaField::Author => &mut detail.author,
            MetaField::JournalTitle => &mut detail.journal_title,
            MetaField::PublicationDate => &mut detail.publication_date,
            MetaField::Keywords => &mut detail.keywords,
            MetaField::Doi => &mut detail.doi,
            MetaField::Issn => &mut detail.issn,
        }
    }
}

/// Meta names copied verbatim into article fields
const META_TABLE: &[(&str, MetaField)] = &[
    ("citation_title", MetaField::CitationTitle),
    ("DC.Creator.PersonalName", MetaField::Author),
    ("citation_journal_title", MetaField::JournalTitle),
    ("citation_publication_date", MetaField::PublicationDate),
    ("citation_keywords", MetaField::Keywords),
    ("citation_doi", MetaField::Doi),
    ("citation_issn", MetaField::Issn),
];

const META_ABSTRACT: &str = "citation_abstract";
const META_CITATION_COUNT: &str = "stats_trdizin_citation_count";
const META_REFERENCE: &str = "citation_reference";
const META_PDF_URL: &str = "citation_pdf_url";
const META_SOURCE_URI: &str = "DC.Source.URI";

/// Named meta tags of an article page
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    /// Last value per name, trimmed
    values: HashMap<String, String>,
    /// Every `citation_reference`, in document order
    references: Vec<String>,
}

impl PageMeta {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut meta = PageMeta::default();

        let Ok(selector) = Selector::parse("meta[name]") else {
            return meta;
        };

        for element in document.select(&selector) {
            let Some(name) = element.value().attr("name") else {
                continue;
            };
            let content = element.value().attr("content").unwrap_or("").trim();

            if name == META_REFERENCE {
                if !content.is_empty() {
                    meta.references.push(content.to_string());
                }
                continue;
            }
            meta.values.insert(name.to_string(), content.to_string());
        }

        meta
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Whether the page carries any of the article meta tags
    pub fn has_article_meta(&self) -> bool {
        META_TABLE.iter().any(|(name, _)| self.get(name).is_some())
    }

    /// Journal home URL, used to locate the index listing
    pub fn journal_url(&self) -> Option<&str> {
        self.get(META_SOURCE_URI)
    }

    /// URL of the journal's index listing page
    pub fn indexes_url(&self) -> Option<String> {
        self.journal_url()
            .map(|base| format!("{}/indexes", base.trim_end_matches('/')))
    }

    /// Build the article detail for `link` (indices are filled separately)
    pub fn to_detail(&self, link: &LinkRecord, base_url: &str, abstract_words: usize) -> ArticleDetail {
        let mut detail = ArticleDetail {
            url: link.url.clone(),
            title: link.title.clone(),
            ..Default::default()
        };

        for (name, field) in META_TABLE {
            *field.slot(&mut detail) = self.get(name).map(str::to_string);
        }

        detail.abstract_text = self
            .get(META_ABSTRACT)
            .map(|text| truncate_words(text, abstract_words));
        detail.citation_count = Some(self.get(META_CITATION_COUNT).unwrap_or("0").to_string());
        detail.reference_count = Some(self.references.len());
        detail.pdf_url = self.get(META_PDF_URL).map(|href| absolutize(base_url, href));

        detail
    }
}

/// Index names on a journal index page, joined with ", "
pub fn parse_indices(html: &str) -> String {
    let Ok(selector) = Selector::parse(INDEX_TITLE_SELECTOR) else {
        return String::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
