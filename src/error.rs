//! Error kinds surfaced by the detection pipeline and the signature catalog loader.

use thiserror::Error;

/// Terminal outcomes of a detection request.
///
/// None of these are retried internally; the only retry in the pipeline is the
/// single HTTPS to HTTP fallback inside the fetcher.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The supplied domain does not normalize to a valid hostname.
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// The request deadline elapsed on one of the attempted schemes.
    #[error("Timeout fetching {domain}")]
    FetchTimeout { domain: String },

    /// Both the HTTPS and HTTP attempts failed below the HTTP layer.
    #[error("Could not reach {domain}: {cause}")]
    Unreachable { domain: String, cause: String },

    /// The caller has exhausted its per-minute quota.
    #[error("Rate limit exceeded: maximum {limit} requests per minute")]
    RateLimited { limit: u32, retry_after_secs: u64 },
}

impl DetectError {
    /// Short machine-friendly name of the error kind, used in logs and batch output.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::InvalidDomain(_) => "invalid_domain",
            DetectError::FetchTimeout { .. } => "fetch_timeout",
            DetectError::Unreachable { .. } => "unreachable",
            DetectError::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Failures while compiling a signature catalog into a registry.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid pattern {pattern:?} in profile {profile}: {source}")]
    InvalidPattern {
        profile: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("header check {description:?} in profile {profile} has no header name")]
    MissingHeaderName { profile: String, description: String },

    #[error("check {description:?} in profile {profile} has zero weight")]
    ZeroWeight { profile: String, description: String },

    #[error("signature catalog contains no profiles")]
    EmptyCatalog,

    #[error("failed to parse signature catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read signature catalog: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders an error and its whole source chain on one line.
///
/// reqwest's top-level message hides the interesting part ("connection refused",
/// "dns error", certificate failures) in nested sources.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = inner.source();
    }
    rendered
}
