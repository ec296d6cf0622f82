use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use cmsprobe::http::{FetchConfig, PageFetcher, MAX_BODY_BYTES, USER_AGENT};
use cmsprobe::DetectError;

fn fast_config() -> FetchConfig {
    FetchConfig {
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(1500),
        ..FetchConfig::default()
    }
}

/// `host:port` of a wiremock server, which only speaks plain HTTP.
fn authority(server: &MockServer) -> String {
    server.address().to_string()
}

#[test]
fn test_default_config() {
    let config = FetchConfig::default();
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.request_timeout, Duration::from_secs(8));
    assert_eq!(config.max_redirects, 5);
    assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
    assert_eq!(MAX_BODY_BYTES, 2 * 1024 * 1024);
    assert!(USER_AGENT.starts_with("Mozilla/5.0"));
}

#[tokio::test]
async fn test_https_failure_falls_back_to_http() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-pingback", "http://example.com/xmlrpc.php")
                .append_header("set-cookie", "wp-settings-1=abc; path=/")
                .set_body_string(r#"<html><head><meta name="generator" content="WordPress 6.5"></head></html>"#),
        )
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(fast_config())?;
    let doc = fetcher.fetch_authority(&authority(&server)).await?;

    assert!(doc.url_final.starts_with("http://"), "got {}", doc.url_final);
    assert_eq!(doc.status_code, 200);
    assert_eq!(doc.header("X-Pingback").as_deref(), Some("http://example.com/xmlrpc.php"));
    assert!(doc.cookies.contains_key("wp-settings-1"));
    assert_eq!(doc.raw_set_cookies.len(), 1);
    assert_eq!(doc.generator(), Some("WordPress 6.5"));
    Ok(())
}

#[tokio::test]
async fn test_sends_browser_user_agent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(|req: &Request| {
            req.headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ua| ua == USER_AGENT)
        })
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bot"))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(fast_config())?;
    let doc = fetcher.fetch_authority(&authority(&server)).await?;
    assert_eq!(doc.status_code, 200);
    assert_eq!(doc.body, "ok");
    Ok(())
}

#[tokio::test]
async fn test_error_status_is_still_a_document() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("x-drupal-cache", "MISS")
                .set_body_string("maintenance"),
        )
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(fast_config())?;
    let doc = fetcher.fetch_authority(&authority(&server)).await?;
    assert_eq!(doc.status_code, 503);
    assert_eq!(doc.header("x-drupal-cache").as_deref(), Some("MISS"));
    Ok(())
}

#[tokio::test]
async fn test_redirects_are_followed() -> Result<()> {
    let server = MockServer::start().await;
    let home = format!("{}/home", server.uri());
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", home.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(fast_config())?;
    let doc = fetcher.fetch_authority(&authority(&server)).await?;
    assert_eq!(doc.url_final, home);
    assert_eq!(doc.body, "landed");
    Ok(())
}

#[tokio::test]
async fn test_body_is_truncated_silently() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(10_000)))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_body_bytes: 1024,
        ..fast_config()
    };
    let fetcher = PageFetcher::new(config)?;
    let doc = fetcher.fetch_authority(&authority(&server)).await?;
    assert_eq!(doc.body.len(), 1024);
    Ok(())
}

#[tokio::test]
async fn test_refused_on_both_schemes_is_unreachable() -> Result<()> {
    // Grab a free port, then close it so both attempts are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let fetcher = PageFetcher::new(fast_config())?;
    match fetcher.fetch_authority(&addr.to_string()).await {
        Err(DetectError::Unreachable { domain, cause }) => {
            assert_eq!(domain, addr.to_string());
            assert!(!cause.is_empty());
        }
        other => panic!("expected Unreachable, got {:?}", other.map(|d| d.url_final)),
    }
    Ok(())
}

#[tokio::test]
async fn test_https_timeout_is_not_retried_over_http() -> Result<()> {
    // Accepts connections and never answers, so the TLS handshake stalls.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    let config = FetchConfig {
        connect_timeout: Duration::from_millis(300),
        request_timeout: Duration::from_millis(600),
        ..FetchConfig::default()
    };
    let fetcher = PageFetcher::new(config)?;

    let start = Instant::now();
    let result = fetcher.fetch_authority(&addr.to_string()).await;
    let elapsed = start.elapsed();

    match result {
        Err(DetectError::FetchTimeout { domain }) => assert_eq!(domain, addr.to_string()),
        other => panic!("expected FetchTimeout, got {:?}", other.map(|d| d.url_final)),
    }
    assert!(elapsed < Duration::from_secs(3), "timeout took {:?}", elapsed);

    // Give a stray fallback connection time to show up before counting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    Ok(())
}
