use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use tokio::runtime::Builder;
use tracing::{debug, info};

use cmsprobe::cli::{Cli, Commands};
use cmsprobe::core::CmsDetector;
use cmsprobe::rate_limit::RateLimiter;
use cmsprobe::sanitize::sanitize_report;
use cmsprobe::server::{start_server, AppState};
use cmsprobe::signatures::SignatureRegistry;

fn main() -> Result<()> {
    // Detection is network bound; a few threads beyond the core count keep
    // slow fetches from starving the scheduler, capped to bound context switching.
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let registry = match &cli.signatures {
        Some(path) => SignatureRegistry::from_path(path)
            .with_context(|| format!("Failed to load signatures from {}", path.display()))?,
        None => SignatureRegistry::builtin().context("Failed to compile built-in signatures")?,
    };
    debug!("Loaded {} CMS profiles", registry.len());

    let detector = CmsDetector::with_registry(cli.concurrent_requests, cli.fetch_config(), Arc::new(registry))?;

    match &cli.command {
        Commands::Single { domain } => {
            info!("Checking single domain: {}", domain);
            let report = detector.detect(domain).await?;
            println!("{}", serde_json::to_string_pretty(&sanitize_report(&report))?);
        }
        Commands::Batch {
            input_file,
            output_file,
            chunk_size,
        } => {
            info!("Processing batch from file: {:?}", input_file);
            detector
                .process_batch(input_file, output_file.as_ref(), *chunk_size)
                .await?;
        }
        Commands::Serve { bind, rate_limit } => {
            if *rate_limit == 0 {
                info!("Rate limiting disabled");
            } else {
                info!("Rate limiting to {} requests per minute per client", rate_limit);
            }
            let state = AppState::new(detector, RateLimiter::new(*rate_limit));
            start_server(*bind, state).await?;
        }
    }

    Ok(())
}
