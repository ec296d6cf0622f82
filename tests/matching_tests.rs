mod common;

use cmsprobe::matching::{match_document, match_profile};
use cmsprobe::signatures::{CheckKind, SignatureRegistry};
use common::{document, page_with_generator};

fn registry() -> SignatureRegistry {
    SignatureRegistry::builtin().expect("built-in catalog compiles")
}

fn signals_for(registry: &SignatureRegistry, name: &str, doc: &cmsprobe::document::FetchedDocument) -> Vec<String> {
    let profile = registry.profile(name).expect("profile exists");
    match_profile(profile, doc).map(|m| m.signals).unwrap_or_default()
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let registry = registry();
    let doc = document(&[("X-Drupal-Cache", "HIT"), ("X-Generator", "Drupal 10 (https://www.drupal.org)")], "");

    assert_eq!(
        signals_for(&registry, "Drupal", &doc),
        vec!["header: X-Drupal-Cache present".to_string(), "header: X-Generator: Drupal".to_string()]
    );
}

#[test]
fn test_header_pattern_searches_value() {
    let registry = registry();
    let squarespace = document(&[("server", "Squarespace")], "");
    let nginx = document(&[("server", "nginx/1.25")], "");

    assert_eq!(signals_for(&registry, "Squarespace", &squarespace).len(), 1);
    assert!(signals_for(&registry, "Squarespace", &nginx).is_empty());
}

#[test]
fn test_presence_check_ignores_value() {
    let registry = registry();
    for value in ["production", "1", "anything at all"] {
        let doc = document(&[("x-wix-request-id", value)], "");
        assert_eq!(
            signals_for(&registry, "Wix", &doc),
            vec!["header: X-Wix-Request-Id present".to_string()]
        );
    }
}

#[test]
fn test_header_check_does_not_read_body() {
    let registry = registry();
    let doc = document(&[], "<p>x-shopify-stage: production</p>");
    let shopify = registry.profile("Shopify").unwrap();
    let header_check = &shopify.checks[0];
    assert_eq!(header_check.kind, CheckKind::Header);
    assert!(!header_check.matches(&doc));
}

#[test]
fn test_cookie_name_match() {
    let registry = registry();
    let doc = document(&[("set-cookie", "PrestaShop-4f1c2d=abc123; path=/; HttpOnly")], "");

    assert_eq!(
        signals_for(&registry, "PrestaShop", &doc),
        vec!["cookie: PrestaShop cookie present".to_string()]
    );
}

#[test]
fn test_cookie_value_match_through_raw_header() {
    let registry = registry();
    // The cookie name is generic; only the value carries the signal.
    let doc = document(&[("set-cookie", "section_data=mage-cache-storage; path=/")], "");

    assert!(doc.cookies.contains_key("section_data"));
    assert_eq!(
        signals_for(&registry, "Magento", &doc),
        vec!["cookie: mage-cache-storage present".to_string()]
    );
}

#[test]
fn test_html_check_searches_body() {
    let registry = registry();
    let doc = document(&[], r#"<div class="sqs-block html-block"></div><script>SQUARESPACE_CONTEXT = {};</script>"#);

    assert_eq!(
        signals_for(&registry, "Squarespace", &doc),
        vec!["html: SQUARESPACE_CONTEXT JS".to_string(), "html: sqs-block CSS classes".to_string()]
    );
}

#[test]
fn test_html_patterns_are_case_insensitive() {
    let registry = registry();
    let doc = document(&[], r#"<meta name="Platform" content="x"><script>var PLATFORM='BigCommerce'</script><b platform='BIGCOMMERCE'></b>"#);

    assert_eq!(
        signals_for(&registry, "BigCommerce", &doc),
        vec!["html: platform=bigcommerce meta".to_string()]
    );
}

#[test]
fn test_meta_generator_signal_is_enriched() {
    let registry = registry();
    let doc = document(&[], &page_with_generator("Ghost 5.80", ""));

    assert_eq!(signals_for(&registry, "Ghost", &doc), vec!["meta_generator: Ghost 5.80".to_string()]);
}

#[test]
fn test_meta_generator_requires_content() {
    let registry = registry();
    let doc = document(&[], r#"<meta name="generator" content=""><p>Ghost</p>"#);

    assert!(signals_for(&registry, "Ghost", &doc).is_empty());
}

#[test]
fn test_meta_generator_name_is_case_insensitive() {
    let registry = registry();
    let doc = document(&[], r#"<head><META NAME="Generator" CONTENT="Webflow"></head>"#);

    assert_eq!(signals_for(&registry, "Webflow", &doc), vec!["meta_generator: Webflow".to_string()]);
}

#[test]
fn test_weights_accumulate_without_dedup() {
    let registry = registry();
    // "data-wf-site" and "data-wf-page" overlap on the same element.
    let doc = document(&[], r#"<html data-wf-site="abc" data-wf-page="def"></html>"#);

    let matches = match_document(&registry, &doc);
    let webflow = matches.iter().find(|m| m.profile.name == "Webflow").unwrap();
    assert_eq!(webflow.score, 55);
}

#[test]
fn test_only_profiles_with_matches_are_returned() {
    let registry = registry();
    let doc = document(&[("x-ghost-cache-status", "miss")], "");

    let matches = match_document(&registry, &doc);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].profile.name, "Ghost");
    assert_eq!(matches[0].score, 30);
}

#[test]
fn test_script_and_meta_kinds() {
    let json = r#"{"threshold": 10, "profiles": [{"name": "Tagged", "checks": [
        {"kind": "script", "pattern": "tagged-runtime\\.js", "weight": 20, "description": "script: runtime"},
        {"kind": "script", "pattern": "window\\.Tagged", "weight": 10, "description": "script: inline global"},
        {"kind": "meta", "pattern": "property=\"tagged:site\"", "weight": 15, "description": "meta: site property"}
    ]}]}"#;
    let registry = SignatureRegistry::from_json(json).unwrap();

    let doc = document(
        &[],
        r#"<head><meta property="tagged:site" content="1"></head>
           <body><script src="/assets/tagged-runtime.js"></script><script>window.Tagged = {}</script></body>"#,
    );
    let matches = match_document(&registry, &doc);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].score, 45);

    // Script checks do not look at plain markup.
    let plain = document(&[], "<p>tagged-runtime.js</p>");
    assert!(match_document(&registry, &plain).is_empty());
}

#[test]
fn test_script_kind_is_scoped_to_script_tags() {
    let json = r#"{"threshold": 10, "profiles": [
        {"name": "ScriptOnly", "checks": [{"kind": "script", "pattern": "Shopify\\.theme", "weight": 30, "description": "script: theme"}]},
        {"name": "BodyWide", "checks": [{"kind": "html", "pattern": "Shopify\\.theme", "weight": 30, "description": "html: theme"}]}
    ]}"#;
    let registry = SignatureRegistry::from_json(json).unwrap();

    let attribute_only = document(&[], r#"<div data-x="Shopify.theme"></div>"#);
    let names: Vec<&str> = match_document(&registry, &attribute_only)
        .iter()
        .map(|m| m.profile.name.as_str())
        .collect();
    assert_eq!(names, vec!["BodyWide"]);

    let in_script = document(&[], "<script>Shopify.theme = {};</script>");
    assert_eq!(match_document(&registry, &in_script).len(), 2);
}
