//! Extract a 7-Zip archive into a fresh temporary directory
//!
//! # Overview
//!
//! The extracted directory is printed on stdout so scripts can capture it.
//! Progress and diagnostics go to stderr.
//!
//! Two strategies are available:
//!
//! - In-process (default): filterable by suffix, entries extracted with
//!   bounded parallelism, archives with path-traversal entries rejected
//! - External (`-x`): the platform's 7-Zip binary extracts everything
//!
//! Ctrl-C cancels the extraction; entries already being written finish first.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use sevenx::args::Args;
use sevenx::{
    ExternalExtractor, ExtractionObserver, ExtractionRequest, ProgressObserver, SevenZipArchive,
    SevenZipExtractor, list_contents,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .format_timestamp(None)
        .init();

    if args.list_only {
        let archive = SevenZipArchive::open(&args.archive)?;
        list_contents(&archive, args.filter.as_deref());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Cancellation requested, waiting for in-flight entries...");
                cancel.cancel();
            }
        }
    });

    let observer: Arc<dyn ExtractionObserver> = Arc::new(ProgressObserver::new(args.quiet)?);

    let result = if args.external {
        let mut extractor = ExternalExtractor::new().with_observer(observer);
        if let Some(dir) = &args.tool_dir {
            extractor = extractor.with_tool_dir(dir);
        }
        extractor.extract(&args.archive, &cancel).await
    } else {
        let mut request = ExtractionRequest::new(&args.archive).concurrent(!args.sequential);
        if let Some(filter) = &args.filter {
            request = request.filter(filter);
        }
        SevenZipExtractor::new()
            .with_observer(observer)
            .with_config(args.extractor_config())
            .extract(&request, &cancel)
            .await
    };
    let output = result.with_context(|| format!("Failed to extract {}", args.archive.display()))?;

    println!("{}", output.display());
    Ok(())
}
