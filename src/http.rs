//! HTTP page fetcher for homepage detection
//!
//! This module retrieves a domain's homepage the way a browser would see it:
//! - HTTPS first, one fallback to plain HTTP on connection-level failure
//! - Timeouts are terminal and never trigger the fallback
//! - Up to 5 redirects followed automatically
//! - Certificate validation disabled so misconfigured sites can still be classified
//! - A browser-like User-Agent to get past trivial bot blocking
//! - Response bodies silently cut at a fixed byte ceiling

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{redirect, Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::document::FetchedDocument;
use crate::error::{error_chain, DetectError};
use crate::validation::NormalizedDomain;

/// Browser User-Agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) \
Chrome/124.0.0.0 Safari/537.36";

/// Largest body kept for matching (2 MiB).
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Tunables for [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Deadline for establishing the connection (TCP and TLS)
    pub connect_timeout: Duration,
    /// Deadline for the whole request including the body
    pub request_timeout: Duration,
    /// Redirect hops followed before giving up
    pub max_redirects: usize,
    /// Body bytes kept; anything beyond is discarded
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(8),
            max_redirects: 5,
            max_body_bytes: MAX_BODY_BYTES,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    /// A deadline elapsed; never retried.
    Timeout,
    /// Refused, DNS failure, TLS failure, abrupt close and the like.
    Connection(String),
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptError::Timeout
        } else {
            AttemptError::Connection(error_chain(&err))
        }
    }
}

/// Fetches homepages into [`FetchedDocument`]s.
///
/// The underlying `reqwest::Client` is built once and pooled across requests.
/// Dropping the future returned by [`PageFetcher::fetch`] aborts the network
/// operation.
///
/// # Examples
///
/// ```no_run
/// use cmsprobe::http::{FetchConfig, PageFetcher};
/// use cmsprobe::validation::normalize_domain;
///
/// # async fn example() -> anyhow::Result<()> {
/// let fetcher = PageFetcher::new(FetchConfig::default())?;
/// let domain = normalize_domain("example.com")?;
/// let doc = fetcher.fetch(&domain).await?;
/// println!("{} -> {}", doc.url_final, doc.status_code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    config: FetchConfig,
}

impl PageFetcher {
    /// Creates a fetcher with the given deadlines and limits
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*"));

        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(true)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches the homepage of a normalized domain
    pub async fn fetch(&self, domain: &NormalizedDomain) -> Result<FetchedDocument, DetectError> {
        self.fetch_authority(domain.as_str()).await
    }

    /// Fetches `https://{authority}/`, falling back once to `http://{authority}/`
    ///
    /// `authority` is a host with an optional port. The fallback only happens for
    /// connection-level failures of the HTTPS attempt; a timeout is returned
    /// immediately as [`DetectError::FetchTimeout`].
    pub async fn fetch_authority(&self, authority: &str) -> Result<FetchedDocument, DetectError> {
        let https_url = format!("https://{}/", authority);
        let https_cause = match self.attempt(&https_url).await {
            Ok(doc) => return Ok(doc),
            Err(AttemptError::Timeout) => {
                debug!("HTTPS attempt for {} timed out", authority);
                return Err(DetectError::FetchTimeout {
                    domain: authority.to_string(),
                });
            }
            Err(AttemptError::Connection(cause)) => cause,
        };

        warn!("HTTPS failed for {}, falling back to HTTP: {}", authority, https_cause);

        let http_url = format!("http://{}/", authority);
        match self.attempt(&http_url).await {
            Ok(doc) => Ok(doc),
            Err(AttemptError::Timeout) => Err(DetectError::FetchTimeout {
                domain: authority.to_string(),
            }),
            Err(AttemptError::Connection(cause)) => Err(DetectError::Unreachable {
                domain: authority.to_string(),
                cause,
            }),
        }
    }

    /// One GET against `url`, reading at most `max_body_bytes` of the body
    async fn attempt(&self, url: &str) -> Result<FetchedDocument, AttemptError> {
        debug!("Fetching {}", url);

        let mut response = self.client.get(url).send().await?;

        let status_code = response.status().as_u16();
        let url_final = response.url().to_string();
        let headers = response.headers().clone();

        let limit = self.config.max_body_bytes;
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = limit - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!("Body of {} truncated at {} bytes", url_final, limit);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} ({}, {} bytes)", url_final, status_code, body.len());

        // Parsing up to the body ceiling is CPU bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let html = String::from_utf8_lossy(&body).into_owned();
            FetchedDocument::new(url_final, status_code, headers, html)
        })
        .await
        .map_err(|e| AttemptError::Connection(format!("document parsing failed: {}", e)))
    }
}
