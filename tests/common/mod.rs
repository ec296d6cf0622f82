//! Shared fixtures for building documents without touching the network.

#![allow(dead_code)]

use cmsprobe::document::FetchedDocument;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Builds a document for `https://example.com/` with the given headers and body.
pub fn document(headers: &[(&str, &str)], body: &str) -> FetchedDocument {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    FetchedDocument::new("https://example.com/", 200, map, body)
}

/// HTML page carrying a generator meta tag and extra body markup.
pub fn page_with_generator(generator: &str, extra: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><meta name="generator" content="{}"><title>t</title></head><body>{}</body></html>"#,
        generator, extra
    )
}
