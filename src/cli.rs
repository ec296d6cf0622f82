//! Command-line interface for the cmsprobe detection tool
//!
//! This module defines the CLI using the clap framework:
//!
//! - Global fetch settings (timeouts, parallelism, signature catalog)
//! - `single` for one-off interactive checks
//! - `batch` for streaming a domain list to JSON lines
//! - `serve` for the rate-limited HTTP API
//!
//! The rate limit for `serve` falls back to the `RATE_LIMIT_RPM` environment
//! variable, and `0` disables limiting.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::http::FetchConfig;

/// Main command-line interface structure for cmsprobe
///
/// Global options apply to every subcommand.
///
/// # Examples
///
/// ```no_run
/// use cmsprobe::cli::{Cli, Commands};
/// use clap::Parser;
///
/// let cli = Cli::parse_from(["cmsprobe", "single", "--domain", "example.com"]);
/// assert!(matches!(cli.command, Commands::Single { .. }));
/// ```
#[derive(Parser)]
#[command(
    name = "cmsprobe",
    about = "Detect which content-management platform powers a website",
    version
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Number of concurrent detections in batch mode
    #[arg(short = 'c', long, default_value = "20")]
    pub concurrent_requests: usize,

    /// Overall request budget in milliseconds, body included
    #[arg(short = 't', long, default_value = "8000")]
    pub timeout_ms: u64,

    /// Connect (TCP + TLS) deadline in milliseconds
    #[arg(long, default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// JSON signature catalog replacing the built-in one
    #[arg(long)]
    pub signatures: Option<PathBuf>,
}

impl Cli {
    /// Fetch settings derived from the global options
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.timeout_ms),
            ..FetchConfig::default()
        }
    }
}

/// Available subcommands
///
/// # Examples
///
/// ```text
/// cmsprobe single --domain example.com
/// cmsprobe batch --input-file domains.txt --output-file results.jsonl
/// cmsprobe serve --bind 0.0.0.0:8080 --rate-limit 30
/// ```
#[derive(Subcommand)]
pub enum Commands {
    /// Detect the CMS of a single domain and print the report
    Single {
        /// Domain to check (e.g., example.com); schemes, paths and ports are stripped
        #[arg(short, long)]
        domain: String,
    },
    /// Detect the CMS of every domain in a file
    ///
    /// Reads one domain per line; empty lines and lines starting with '#'
    /// are skipped. Results are written as JSON lines.
    Batch {
        /// Input file containing domains (one per line)
        #[arg(short, long)]
        input_file: PathBuf,

        /// Output file for results (one JSON object per line)
        /// If not specified, results are printed to stdout
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// Number of domains read and processed per chunk
        #[arg(long, default_value = "100")]
        chunk_size: usize,
    },
    /// Serve the detection HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Requests per minute per client, 0 disables rate limiting
        #[arg(short, long, env = "RATE_LIMIT_RPM", default_value = "30")]
        rate_limit: u32,
    },
}
