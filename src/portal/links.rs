//! Result-card parsing.

use scraper::{Html, Selector};

use super::{absolutize, TITLE_LINK_SELECTOR};
use crate::models::LinkRecord;

/// Parse one card's outer HTML into a link record
pub fn parse_card(card_html: &str, base_url: &str) -> Option<LinkRecord> {
    let selector = Selector::parse(TITLE_LINK_SELECTOR).ok()?;
    let fragment = Html::parse_fragment(card_html);
    let anchor = fragment.select(&selector).next()?;

    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }

    let title = anchor.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = if title.is_empty() {
        "N/A".to_string()
    } else {
        title
    };

    Some(LinkRecord::new(absolutize(base_url, href), title))
}

/// Parse every card, skipping ones without a title link
pub fn extract_links(cards: &[String], base_url: &str) -> Vec<LinkRecord> {
    cards
        .iter()
        .filter_map(|card| parse_card(card, base_url))
        .collect()
}
