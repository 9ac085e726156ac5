//! Page metadata fetching
//!
//! Fills in the title and description of a bookmark when `add` is given
//! only a URL.

use anyhow::Result;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

/// Metadata extracted from a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Fetch timeout in seconds
const FETCH_TIMEOUT: u64 = 10;

/// Fetch metadata from a URL
///
/// Returns empty metadata on failure.
pub async fn fetch_metadata(url: &str) -> PageMetadata {
    match fetch_metadata_inner(url).await {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Metadata fetch failed for {}: {:#}", url, e);
            PageMetadata::default()
        }
    }
}

async fn fetch_metadata_inner(url: &str) -> Result<PageMetadata> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT))
        .user_agent("Mozilla/5.0 (compatible; Smartmark/1.0)")
        .build()?;

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Ok(PageMetadata::default());
    }

    let html = response.text().await?;
    Ok(parse_metadata(&html))
}

/// Parse metadata from HTML content
fn parse_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    PageMetadata {
        title: extract_title(&document),
        description: extract_description(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    if let Some(title) = extract_meta_content(document, "og:title") {
        return Some(title);
    }
    if let Some(title) = extract_meta_content(document, "twitter:title") {
        return Some(title);
    }

    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_description(document: &Html) -> Option<String> {
    extract_meta_content(document, "og:description")
        .or_else(|| extract_meta_content(document, "twitter:description"))
        .or_else(|| extract_meta_content(document, "description"))
}

/// Content of a meta tag, matched by `property` (Open Graph) or `name`
fn extract_meta_content(document: &Html, key: &str) -> Option<String> {
    ["property", "name"].iter().find_map(|attr| {
        let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, key)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
    })
}
