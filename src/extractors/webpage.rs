//! Webpage extractor (§4.4): fetches HTML over HTTP, strips script/style
//! blocks, resolves relative links against the page's own URL, converts the
//! remainder to Markdown, and records the common meta tags. JS rendering is
//! explicitly out of scope — only the server-rendered HTML is seen.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;
use crate::worker::http::{HttpClient, HttpConfig};

const META_FIELDS: &[&str] = &["title", "description", "author", "og:title", "og:description", "og:image"];

#[derive(Default)]
pub struct WebpageExtractor;

#[async_trait]
impl Extractor for WebpageExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let url = match source {
            Source::Url(u) => u,
            Source::Path(_) => {
                return Err(ExtractorError::Malformed("webpage extractor requires a URL".into()));
            }
        };

        let client = HttpClient::new(HttpConfig::default(), None)
            .map_err(|e| ExtractorError::Fetch(e.to_string()))?;
        let bytes = client
            .download(url, Vec::new())
            .await
            .map_err(|e| ExtractorError::Fetch(e.to_string()))?;
        let html = String::from_utf8_lossy(&bytes).into_owned();

        let meta = extract_meta(&html);
        let cleaned = strip_tag_blocks(&strip_tag_blocks(&html, "script"), "style");
        let resolved = resolve_relative_urls(&cleaned, url);
        let formatted_markdown = htmd::convert(&resolved).unwrap_or(resolved.clone());

        let structured_data = if meta.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&meta).unwrap_or_default())
        };

        Ok(ExtractionResult {
            raw_text: html,
            formatted_markdown,
            structured_data,
        })
    }
}

fn extract_meta(html: &str) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let meta_selector = Selector::parse("meta").expect("static selector");
    let title_selector = Selector::parse("title").expect("static selector");
    let mut meta = HashMap::new();

    if let Some(title) = document.select(&title_selector).next() {
        meta.insert("title".to_string(), title.text().collect::<String>().trim().to_string());
    }

    for element in document.select(&meta_selector) {
        let key = element
            .value()
            .attr("property")
            .or_else(|| element.value().attr("name"))
            .map(str::to_lowercase);
        let Some(key) = key else { continue };
        if !META_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if let Some(content) = element.value().attr("content") {
            meta.insert(key, content.to_string());
        }
    }

    meta
}

/// Removes every `<tag ...>...</tag>` block, case-insensitively. Not a full
/// HTML parser pass — good enough for script/style, which never nest.
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let open_needle = format!("<{tag}");
    let close_needle = format!("</{tag}>");
    let lower = html.to_lowercase();
    let mut result = String::with_capacity(html.len());
    let mut cursor = 0usize;

    while let Some(open_rel) = lower[cursor..].find(&open_needle) {
        let open_start = cursor + open_rel;
        result.push_str(&html[cursor..open_start]);

        match lower[open_start..].find(&close_needle) {
            Some(close_rel) => {
                cursor = open_start + close_rel + close_needle.len();
            }
            None => {
                cursor = html.len();
                break;
            }
        }
    }
    result.push_str(&html[cursor..]);
    result
}

/// Rewrites `href="..."` and `src="..."` attribute values that are relative
/// paths into absolute URLs resolved against `base`.
fn resolve_relative_urls(html: &str, base: &str) -> String {
    let Ok(base_url) = url::Url::parse(base) else {
        return html.to_string();
    };
    let document = Html::parse_document(html);
    let mut replacements: Vec<(String, String)> = Vec::new();

    for attr in ["href", "src"] {
        let selector = Selector::parse(&format!("[{attr}]")).expect("static selector");
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attr) {
                if is_relative(value) {
                    if let Ok(resolved) = base_url.join(value) {
                        replacements.push((format!("{attr}=\"{value}\""), format!("{attr}=\"{resolved}\"")));
                    }
                }
            }
        }
    }

    let mut rewritten = html.to_string();
    for (from, to) in replacements {
        rewritten = rewritten.replace(&from, &to);
    }
    rewritten
}

fn is_relative(value: &str) -> bool {
    !value.starts_with("http://")
        && !value.starts_with("https://")
        && !value.starts_with('#')
        && !value.starts_with("mailto:")
        && !value.starts_with("tel:")
        && !value.starts_with("data:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_meta_reads_title_and_og_tags() {
        let html = r#"<html><head>
            <title>My Page</title>
            <meta name="description" content="A test page">
            <meta property="og:title" content="OG Title">
        </head><body></body></html>"#;
        let meta = extract_meta(html);
        assert_eq!(meta.get("title"), Some(&"My Page".to_string()));
        assert_eq!(meta.get("description"), Some(&"A test page".to_string()));
        assert_eq!(meta.get("og:title"), Some(&"OG Title".to_string()));
    }

    #[test]
    fn strip_tag_blocks_removes_script_and_style() {
        let html = "<p>keep</p><script>var x = 1;</script><style>.a{}</style><p>also keep</p>";
        let stripped = strip_tag_blocks(&strip_tag_blocks(html, "script"), "style");
        assert!(!stripped.contains("var x"));
        assert!(!stripped.contains(".a{}"));
        assert!(stripped.contains("keep"));
        assert!(stripped.contains("also keep"));
    }

    #[test]
    fn resolve_relative_urls_rewrites_relative_href() {
        let html = r#"<a href="/about">About</a>"#;
        let resolved = resolve_relative_urls(html, "https://example.com/blog/post");
        assert!(resolved.contains("https://example.com/about"));
    }

    #[test]
    fn resolve_relative_urls_leaves_absolute_and_anchor_links_alone() {
        let html = r#"<a href="https://other.com/x">x</a><a href="#section">s</a>"#;
        let resolved = resolve_relative_urls(html, "https://example.com/");
        assert_eq!(resolved, html);
    }
}
