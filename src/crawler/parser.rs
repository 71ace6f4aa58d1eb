//! HTML parser for extracting links and readable content
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title and meta description
//! - Visible body text for relevance classification

use crate::crawler::FetchError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Elements whose text is never shown to a reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];

/// Readable content of one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Visible body text with whitespace collapsed
    pub text: String,
}

impl ExtractedContent {
    /// Text handed to the relevance classifier: title, description and body
    pub fn classification_text(&self) -> String {
        [self.title.as_deref(), self.description.as_deref(), Some(self.text.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns an HTML document into readable content
///
/// Implementations must be pure: parsing happens synchronously and nothing
/// is held across an await point.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &Url) -> Result<ExtractedContent, FetchError>;
}

/// Default extractor built on scraper
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTextExtractor;

impl ContentExtractor for HtmlTextExtractor {
    fn extract(&self, html: &str, url: &Url) -> Result<ExtractedContent, FetchError> {
        let parsed = parse_html(html, url);
        let content = parsed.content;

        if content.text.is_empty() && content.title.is_none() {
            return Err(FetchError::Extract {
                url: url.to_string(),
                reason: "no title and no visible text".to_string(),
            });
        }

        Ok(content)
    }
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub content: ExtractedContent,

    /// All links found on the page (absolute URLs)
    pub links: Vec<String>,
}

/// Parses HTML content and extracts links and readable content
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document, including those
///   carrying a `download` attribute (attachments are found by fetching them)
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
///
/// # Example
///
/// ```
/// use veil_fetch::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.content.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let content = ExtractedContent {
        title: extract_title(&document),
        description: extract_description(&document),
        text: extract_visible_text(&document),
    };
    let links = collect_links(&document, base_url);

    ParsedPage { content, links }
}

/// Convenience function for extracting just the links from HTML
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    collect_links(&document, base_url)
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// `<meta name="description">`, falling back to `og:description`
fn extract_description(document: &Html) -> Option<String> {
    ["meta[name='description']", "meta[property='og:description']"]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .filter_map(|element| element.value().attr("content"))
                .map(collapse_whitespace)
                .find(|s| !s.is_empty())
        })
}

fn extract_visible_text(document: &Html) -> String {
    let Ok(body_selector) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut text = String::new();
    for node in body.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ElementRef::wrap(ancestor)
                .map(|element| HIDDEN_ELEMENTS.contains(&element.value().name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        text.push_str(fragment);
        text.push(' ');
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None for special schemes, fragment-only links, unparseable
/// hrefs and anything that is not HTTP(S) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    matches!(absolute_url.scheme(), "http" | "https").then(|| absolute_url.to_string())
}
