//! # docs-indexer CLI
//!
//! Rebuilds one search index per invocation and swaps its alias.
//! All settings come from the environment (optionally seeded from the TOML
//! file named by `INDEXER_CONFIG`).
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docs-indexer docs` | Index the documentation repository (plus OpenAPI operations) |
//! | `docs-indexer blog` | Index published Hubspot blog posts |
//!
//! Exit code 0 on success, including runs with nothing new to index;
//! 1 on any fatal error.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docs_indexer::config::Config;
use docs_indexer::ingest::{self, RunOutcome};
use docs_indexer::publisher::PhaseTracker;

#[derive(Parser)]
#[command(
    name = "docs-indexer",
    about = "Builds versioned search indexes and publishes them behind a stable alias",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the documentation site.
    ///
    /// Reads Markdown pages from `REPOSITORY_PATH`, or clones
    /// `REPOSITORY_HANDLE` from GitHub, and appends OpenAPI operations
    /// when `APIDOCS_BASE_URI`, `APIDOCS_BASE_PATH` and `API_SPEC_FILES`
    /// are set.
    Docs,

    /// Index published blog posts from the Hubspot CMS API.
    Blog,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docs_indexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let tracker = PhaseTracker::new();
    let run: JoinHandle<anyhow::Result<RunOutcome>> = match cli.command {
        Commands::Docs => match config.docs_settings() {
            Ok(settings) => {
                let tracker = tracker.clone();
                tokio::spawn(async move { ingest::run_docs(&settings, tracker).await })
            }
            Err(e) => {
                error!(error = %e, "invalid configuration");
                return ExitCode::FAILURE;
            }
        },
        Commands::Blog => match config.blog_settings() {
            Ok(settings) => {
                let tracker = tracker.clone();
                tokio::spawn(async move { ingest::run_blog(&settings, tracker).await })
            }
            Err(e) => {
                error!(error = %e, "invalid configuration");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut run = run;
    let signal = tokio::select! {
        joined = &mut run => return finish(joined),
        signal = shutdown_signal() => signal,
    };

    info!(signal, "shutdown requested");
    if tracker.commit_in_flight() {
        info!("waiting for the alias swap to complete");
        return finish(run.await);
    }

    // Blocking work (git, tree scans) cannot be cancelled and would hold
    // up runtime shutdown. Nothing has been published yet, so leave now.
    run.abort();
    info!(phase = ?tracker.get(), "run abandoned before publication");
    std::process::exit(0)
}

fn finish(joined: Result<anyhow::Result<RunOutcome>, tokio::task::JoinError>) -> ExitCode {
    match joined {
        Ok(Ok(outcome)) => {
            info!(index = outcome.index(), "run complete");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!(error = %format!("{:#}", e), "indexing failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "indexing task failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
