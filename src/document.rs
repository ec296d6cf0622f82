//! Fetched homepage representation and its parse-once tag view.

use reqwest::header::{HeaderMap, SET_COOKIE};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

static META_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("static selector 'meta' must parse"));
static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("static selector 'script' must parse"));

/// The facets of a homepage that signature checks look at.
///
/// Owned by the request that fetched it; never cached or shared.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL after redirects were followed.
    pub url_final: String,
    pub status_code: u16,
    /// Response headers; lookups through [`FetchedDocument::header`] are case-insensitive.
    pub headers: HeaderMap,
    /// Cookie name to value, taken from the final response's `Set-Cookie` headers.
    pub cookies: HashMap<String, String>,
    /// Raw `Set-Cookie` header values, for patterns that target cookie values or attributes.
    pub raw_set_cookies: Vec<String>,
    /// HTML body, already cut to the fetcher's byte ceiling.
    pub body: String,
    pub tags: TagView,
}

impl FetchedDocument {
    /// Builds a document from response parts, deriving cookies and the tag view.
    pub fn new(
        url_final: impl Into<String>,
        status_code: u16,
        headers: HeaderMap,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();

        let raw_set_cookies: Vec<String> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();

        let cookies = raw_set_cookies
            .iter()
            .filter_map(|raw| parse_cookie_pair(raw))
            .collect();

        let tags = TagView::parse(&body);

        Self {
            url_final: url_final.into(),
            status_code,
            headers,
            cookies,
            raw_set_cookies,
            body,
            tags,
        }
    }

    /// Value of the named header, with repeated headers joined by `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<String> = self
            .headers
            .get_all(name.to_ascii_lowercase().as_str())
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Content of the first generator meta tag, if it has a non-empty one.
    pub fn generator(&self) -> Option<&str> {
        self.tags.generator.as_deref()
    }
}

/// Splits `name=value; attrs...` into a trimmed name/value pair.
fn parse_cookie_pair(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

/// Tag-level facts extracted from the body in a single parse.
///
/// `scraper::Html` is not `Send`, so the parsed tree is dropped right after
/// extraction and only owned strings survive into the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagView {
    /// `content` of the first `<meta>` whose `name` contains "generator"
    /// (case-insensitive), when that content is non-empty.
    pub generator: Option<String>,
    /// `src` attributes and inline text of every `<script>` tag.
    pub scripts: Vec<String>,
    /// Every `<meta>` tag rendered as `key="value"` pairs separated by spaces.
    pub meta_tags: Vec<String>,
}

impl TagView {
    /// Parses `html` leniently; malformed markup yields whatever tags html5ever recovers.
    pub fn parse(html: &str) -> Self {
        if html.is_empty() {
            return Self::default();
        }

        let document = Html::parse_document(html);
        let mut view = Self::default();
        let mut generator_seen = false;

        for meta in document.select(&META_SELECTOR) {
            let element = meta.value();

            if !generator_seen {
                let is_generator = element
                    .attr("name")
                    .map(|name| name.to_ascii_lowercase().contains("generator"))
                    .unwrap_or(false);
                if is_generator {
                    generator_seen = true;
                    view.generator = element
                        .attr("content")
                        .map(str::trim)
                        .filter(|content| !content.is_empty())
                        .map(String::from);
                }
            }

            let rendered = element
                .attrs()
                .map(|(key, value)| format!("{}=\"{}\"", key, value))
                .collect::<Vec<_>>()
                .join(" ");
            if !rendered.is_empty() {
                view.meta_tags.push(rendered);
            }
        }

        for script in document.select(&SCRIPT_SELECTOR) {
            if let Some(src) = script.value().attr("src") {
                view.scripts.push(src.to_string());
            }
            let inline: String = script.text().collect();
            if !inline.trim().is_empty() {
                view.scripts.push(inline);
            }
        }

        view
    }
}
