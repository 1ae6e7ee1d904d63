//! Indexing run orchestration.
//!
//! One run: probe the source version → fetch documents → create the
//! versioned index → populate → swap the alias → retire old indices.
//! Per-document failures are collected into the [`RunSummary`]; anything
//! else aborts the run with the alias still on the previous index.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{BlogSettings, DocsSettings, RepositorySource, StoreSettings};
use crate::connector_fs::TreeSource;
use crate::connector_git::GitDocsSource;
use crate::connector_hubspot::BlogSource;
use crate::http::{build_client, RetryPolicy};
use crate::models::{IndexVersion, SkipReason};
use crate::openapi::OpenApiSource;
use crate::publisher::{PhaseTracker, Publisher};
use crate::schema::IndexSchema;
use crate::store::elasticsearch::ElasticsearchStore;
use crate::store::DocumentStore;
use crate::traits::ContentSource;

/// Counts and skip reasons of a published run.
#[derive(Debug)]
pub struct RunSummary {
    pub index: String,
    pub written: usize,
    pub skipped: Vec<SkipReason>,
    /// Indices the alias pointed to before, now deleted.
    pub retired: Vec<String>,
    pub cleanup_failures: Vec<String>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// An index for this content version already exists.
    AlreadyIndexed { index: String },
    /// No document could be written; the alias was left alone.
    NothingToPublish {
        index: String,
        skipped: Vec<SkipReason>,
    },
    Published(RunSummary),
}

impl RunOutcome {
    pub fn index(&self) -> &str {
        match self {
            RunOutcome::AlreadyIndexed { index } => index,
            RunOutcome::NothingToPublish { index, .. } => index,
            RunOutcome::Published(summary) => &summary.index,
        }
    }
}

/// Run one source into one alias.
pub async fn run_pipeline(
    source: &dyn ContentSource,
    store: &dyn DocumentStore,
    prefix: &str,
    schema: IndexSchema,
    tracker: PhaseTracker,
) -> Result<RunOutcome> {
    if let Some(token) = source.probe_version().await? {
        let probed = IndexVersion::new(prefix, &token)?;
        let index = probed.full_name();
        if store.index_exists(&index).await? {
            info!(source = source.name(), index = %index, "content already indexed");
            return Ok(RunOutcome::AlreadyIndexed { index });
        }
    }

    let fetched = source
        .fetch()
        .await
        .with_context(|| format!("failed to fetch content from {}", source.name()))?;
    info!(
        source = source.name(),
        version = %fetched.version_token,
        documents = fetched.documents.len(),
        "fetched content"
    );

    let version = IndexVersion::new(prefix, &fetched.version_token)?;
    let publisher = Publisher::new(store, version, schema, tracker);
    let index = publisher.version().full_name();
    if !publisher.create().await? {
        return Ok(RunOutcome::AlreadyIndexed { index });
    }

    let report = publisher.populate(fetched.documents).await;
    if report.written == 0 {
        publisher.discard().await;
        return Ok(RunOutcome::NothingToPublish {
            index,
            skipped: report.skipped,
        });
    }

    let cleanup = publisher.publish().await?;
    Ok(RunOutcome::Published(RunSummary {
        index,
        written: report.written,
        skipped: report.skipped,
        retired: cleanup.retired,
        cleanup_failures: cleanup.failures,
    }))
}

/// Index the documentation site.
pub async fn run_docs(settings: &DocsSettings, tracker: PhaseTracker) -> Result<RunOutcome> {
    let client = build_client(&settings.http)?;
    let policy = RetryPolicy::from_config(&settings.http);
    let store = connect(&settings.store, client.clone(), policy.clone()).await?;
    let schema = load_schema(&settings.store, IndexSchema::docs())?;

    let openapi = settings
        .openapi
        .clone()
        .map(|openapi| OpenApiSource::new(openapi, client.clone(), policy.clone()));
    let source: Box<dyn ContentSource> = match &settings.repository {
        RepositorySource::Local(path) => {
            let tree = TreeSource::new(
                &settings.index_name,
                path.clone(),
                settings.subfolder.clone(),
                settings.locator.clone(),
            );
            Box::new(match openapi {
                Some(openapi) => tree.with_openapi(openapi),
                None => tree,
            })
        }
        RepositorySource::GitHub(github) => Box::new(GitDocsSource::new(
            &settings.index_name,
            github.clone(),
            settings.subfolder.clone(),
            settings.locator.clone(),
            client,
            policy,
            openapi,
        )),
    };

    let outcome = run_pipeline(
        source.as_ref(),
        &store,
        &settings.index_name,
        schema,
        tracker,
    )
    .await?;
    print_summary("docs", &outcome);
    Ok(outcome)
}

/// Index the blog.
pub async fn run_blog(settings: &BlogSettings, tracker: PhaseTracker) -> Result<RunOutcome> {
    let client = build_client(&settings.http)?;
    let policy = RetryPolicy::from_config(&settings.http);
    let store = connect(&settings.store, client.clone(), policy.clone()).await?;
    let schema = load_schema(&settings.store, IndexSchema::blog())?;

    let source = BlogSource::new(
        &settings.index_name,
        &settings.endpoint,
        &settings.access_token,
        client,
        policy,
    );
    let outcome = run_pipeline(&source, &store, &settings.index_name, schema, tracker).await?;
    print_summary("blog", &outcome);
    Ok(outcome)
}

/// Wait out the startup delay, then build the store client.
async fn connect(
    settings: &StoreSettings,
    client: reqwest::Client,
    policy: RetryPolicy,
) -> Result<ElasticsearchStore> {
    if !settings.startup_delay.is_zero() {
        info!(
            seconds = settings.startup_delay.as_secs(),
            "waiting before contacting the search engine"
        );
        tokio::time::sleep(settings.startup_delay).await;
    }
    ElasticsearchStore::new(client, &settings.endpoint, settings.api_key.clone(), policy)
}

fn load_schema(settings: &StoreSettings, bundled: IndexSchema) -> Result<IndexSchema> {
    match &settings.mapping_file {
        Some(path) => IndexSchema::from_mapping_file(path),
        None => Ok(bundled),
    }
}

fn print_summary(command: &str, outcome: &RunOutcome) {
    println!("index {}", command);
    match outcome {
        RunOutcome::AlreadyIndexed { index } => {
            println!("  {} is up to date", index);
        }
        RunOutcome::NothingToPublish { index, skipped } => {
            println!("  nothing to publish for {}", index);
            print_skipped(skipped);
        }
        RunOutcome::Published(summary) => {
            println!("  published: {}", summary.index);
            println!("  written: {}", summary.written);
            print_skipped(&summary.skipped);
            if !summary.retired.is_empty() {
                println!("  retired: {}", summary.retired.join(", "));
            }
            for failure in &summary.cleanup_failures {
                println!("  cleanup failed: {}", failure);
            }
        }
    }
}

fn print_skipped(skipped: &[SkipReason]) {
    println!("  skipped: {}", skipped.len());
    for reason in skipped {
        println!("    - {}", reason);
    }
}
