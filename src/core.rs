//! Core detection pipeline
//!
//! This module wires the pipeline together:
//! - Domain normalization
//! - Homepage fetching with HTTPS to HTTP fallback
//! - Signature matching against the compiled registry
//! - Scoring, confidence and version extraction
//! - Batch processing of domain lists with bounded parallelism

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, error, info};

use crate::{
    document::FetchedDocument,
    error::DetectError,
    http::{FetchConfig, PageFetcher},
    sanitize::sanitize_report,
    scoring::{detect_cms, DetectionResult},
    signatures::SignatureRegistry,
    validation::normalize_domain,
};

/// Successful detection for one domain
///
/// # Examples
///
/// ```
/// use cmsprobe::core::DetectionReport;
///
/// let report = DetectionReport {
///     domain: "example.com".to_string(),
///     url_checked: "https://example.com/".to_string(),
///     cms: Some("WordPress".to_string()),
///     confidence: 52,
///     signals: vec!["meta_generator: WordPress 6.5".to_string()],
///     version: Some("6.5".to_string()),
///     elapsed_ms: 420,
/// };
/// assert!(report.cms.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// The normalized domain that was checked
    pub domain: String,
    /// Final URL after redirects
    pub url_checked: String,
    /// Detected CMS name, if any
    pub cms: Option<String>,
    /// Confidence from 0 to 100
    pub confidence: u8,
    /// Matched signal descriptions in catalog order
    pub signals: Vec<String>,
    /// Version advertised by the generator tag
    pub version: Option<String>,
    /// Time spent normalizing, fetching and scoring in milliseconds
    pub elapsed_ms: u64,
}

impl DetectionReport {
    fn new(domain: String, doc: &FetchedDocument, result: DetectionResult, elapsed_ms: u64) -> Self {
        Self {
            domain,
            url_checked: doc.url_final.clone(),
            cms: result.cms,
            confidence: result.confidence,
            signals: result.signals,
            version: result.version,
            elapsed_ms,
        }
    }
}

/// One line of batch output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Detected(DetectionReport),
    Failed {
        domain: String,
        error: String,
        kind: String,
        elapsed_ms: u64,
    },
}

/// Detection engine shared by the CLI and the HTTP boundary
///
/// Holds the pooled fetcher and the compiled registry behind `Arc`s; clones are
/// cheap and share both.
///
/// # Examples
///
/// ```no_run
/// use cmsprobe::core::CmsDetector;
/// use cmsprobe::http::FetchConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let detector = CmsDetector::new(10, FetchConfig::default())?;
/// let report = detector.detect("wordpress.org").await?;
/// println!("{:?} ({}%)", report.cms, report.confidence);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CmsDetector {
    /// Fetcher for homepage retrieval
    fetcher: Arc<PageFetcher>,
    /// Compiled signature catalog
    registry: Arc<SignatureRegistry>,
    /// Maximum number of concurrent detections in batch mode
    concurrent_limit: usize,
}

impl CmsDetector {
    /// Creates a detector using the built-in signature catalog
    pub fn new(concurrent_requests: usize, config: FetchConfig) -> Result<Self> {
        let registry = SignatureRegistry::builtin().context("Failed to compile built-in signatures")?;
        Self::with_registry(concurrent_requests, config, Arc::new(registry))
    }

    /// Creates a detector with an explicit registry
    pub fn with_registry(
        concurrent_requests: usize,
        config: FetchConfig,
        registry: Arc<SignatureRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher: Arc::new(PageFetcher::new(config)?),
            registry,
            concurrent_limit: concurrent_requests.max(1),
        })
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// Normalizes `raw`, fetches the homepage and scores it
    ///
    /// # Errors
    ///
    /// * [`DetectError::InvalidDomain`] when `raw` is not a hostname
    /// * [`DetectError::FetchTimeout`] when a deadline elapsed
    /// * [`DetectError::Unreachable`] when neither HTTPS nor HTTP connected
    pub async fn detect(&self, raw: &str) -> Result<DetectionReport, DetectError> {
        let start = Instant::now();
        let domain = normalize_domain(raw)?;
        self.detect_from(domain.as_str(), start).await
    }

    /// Detects against `host[:port]` exactly as given, skipping normalization
    ///
    /// Useful for hosts on non-default ports, which [`CmsDetector::detect`]
    /// would strip.
    pub async fn detect_authority(&self, authority: &str) -> Result<DetectionReport, DetectError> {
        self.detect_from(authority, Instant::now()).await
    }

    async fn detect_from(&self, authority: &str, start: Instant) -> Result<DetectionReport, DetectError> {
        debug!("Starting detection for {}", authority);

        let doc = self.fetcher.fetch_authority(authority).await?;
        let result = self.analyze(&doc);

        info!(
            "{}: cms={:?} confidence={} signals={}",
            authority,
            result.cms,
            result.confidence,
            result.signals.len()
        );

        Ok(DetectionReport::new(
            authority.to_string(),
            &doc,
            result,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// Scores an already fetched document
    pub fn analyze(&self, doc: &FetchedDocument) -> DetectionResult {
        detect_cms(&self.registry, doc)
    }

    /// Runs detection and folds failures into a [`BatchOutcome`]
    pub async fn detect_outcome(&self, raw: &str) -> BatchOutcome {
        let start = Instant::now();
        match self.detect(raw).await {
            Ok(report) => BatchOutcome::Detected(report),
            Err(e) => {
                error!("Detection failed for {}: {}", raw, e);
                BatchOutcome::Failed {
                    domain: raw.to_string(),
                    error: e.to_string(),
                    kind: e.kind().to_string(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Processes a file of domains, one per line
    ///
    /// Blank lines and lines starting with `#` are skipped. Domains are read in
    /// chunks of `chunk_size`, each chunk is detected with up to the configured
    /// concurrency, and results are written as JSON lines to `output_file` or
    /// pretty-printed to stdout.
    pub async fn process_batch(
        &self,
        input_file: &Path,
        output_file: Option<&PathBuf>,
        chunk_size: usize,
    ) -> Result<usize> {
        let chunk_size = chunk_size.max(1);

        let mut output_writer = if let Some(path) = output_file {
            Some(
                OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(path)
                    .await
                    .context("Failed to create output file")?,
            )
        } else {
            None
        };

        let file = File::open(input_file)
            .await
            .with_context(|| format!("Failed to open domain file: {:?}", input_file))?;

        let mut lines = BufReader::with_capacity(64 * 1024, file).lines();
        let mut processed = 0;
        let mut current_chunk = Vec::with_capacity(chunk_size);

        info!("Processing domains from {}", input_file.display());

        loop {
            let line = lines.next_line().await?;
            let at_end = line.is_none();

            if let Some(line) = line {
                let domain = line.trim();
                if !domain.is_empty() && !domain.starts_with('#') {
                    current_chunk.push(domain.to_string());
                }
            }

            if current_chunk.len() >= chunk_size || (at_end && !current_chunk.is_empty()) {
                processed += current_chunk.len();
                info!("Processing chunk of {} domains ({} total so far)", current_chunk.len(), processed);

                let outcomes = self.process_chunk(&current_chunk).await;
                for outcome in outcomes {
                    let outcome = match outcome {
                        BatchOutcome::Detected(report) => BatchOutcome::Detected(sanitize_report(&report)),
                        failed => failed,
                    };

                    if let Some(ref mut writer) = output_writer {
                        let json_line = format!("{}\n", serde_json::to_string(&outcome)?);
                        writer.write_all(json_line.as_bytes()).await?;
                    } else {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    }
                }

                if let Some(ref mut writer) = output_writer {
                    writer.flush().await?;
                }

                current_chunk.clear();
            }

            if at_end {
                break;
            }
        }

        info!("Batch processing completed, processed {} domains in total", processed);
        Ok(processed)
    }

    /// Detects a chunk of domains concurrently, preserving input order
    async fn process_chunk(&self, domains: &[String]) -> Vec<BatchOutcome> {
        stream::iter(domains)
            .map(|domain| {
                let detector = self.clone();
                let domain = domain.clone();
                async move { detector.detect_outcome(&domain).await }
            })
            .buffered(self.concurrent_limit)
            .collect()
            .await
    }
}
