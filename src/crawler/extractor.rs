//! HTML content extraction
//!
//! This module turns a fetched HTML body into what the index and the frontier
//! need:
//! - The page title (collapsed, bounded, with a fallback)
//! - The visible text (scripts and styles removed, bounded)
//! - Same-origin links to follow, in document order without duplicates

use crate::url::same_origin;
use scraper::{Html, Node, Selector};
use url::Url;

/// Longest title kept, in characters
pub const MAX_TITLE_LENGTH: usize = 1000;

/// Title used when the document has none
pub const FALLBACK_TITLE: &str = "No Title";

/// Elements whose text is never visible
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Content extracted from an HTML page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,

    /// Visible text, whitespace collapsed, at most the configured length
    pub text: String,

    /// Absolute same-origin links without fragments
    pub links: Vec<String>,
}

/// Extracts title, visible text and followable links from an HTML body
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags resolved against `base_url`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only links
/// - Anything not on the same scheme, host and port as `base_url`
///
/// Extraction never fails; malformed markup yields whatever the lenient
/// parser recovers, possibly nothing.
///
/// # Example
///
/// ```
/// use trawler::crawler::extract;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let page = extract(html, &base_url, 10_000);
/// assert_eq!(page.title, "Test");
/// assert_eq!(page.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn extract(html: &str, base_url: &Url, max_content_length: usize) -> ExtractedPage {
    let document = Html::parse_document(html);

    ExtractedPage {
        title: extract_title(&document),
        text: extract_text(&document, max_content_length),
        links: extract_links(&document, base_url),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> String {
    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|element| collapse_whitespace(element.text()))
    });

    match title {
        Some(t) if !t.is_empty() => truncate_chars(t, MAX_TITLE_LENGTH),
        _ => FALLBACK_TITLE.to_string(),
    }
}

/// Collects the visible text of the document
fn extract_text(document: &Html, max_len: usize) -> String {
    let visible = document.root_element().descendants().filter_map(|node| {
        let Node::Text(text) = node.value() else {
            return None;
        };
        let hidden = node.ancestors().any(|ancestor| {
            matches!(ancestor.value(), Node::Element(el) if HIDDEN_ELEMENTS.contains(&el.name()))
        });
        (!hidden).then(|| &**text)
    });

    truncate_chars(collapse_whitespace(visible), max_len)
}

/// Extracts followable links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(url) = resolve_link(href, base_url) {
            if same_origin(&url, base_url) {
                let link = url.to_string();
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL without fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links (same page anchors)
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    absolute_url.set_fragment(None);
    Some(absolute_url)
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn truncate_chars(s: String, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s,
    }
}
