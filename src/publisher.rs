//! Blue-green index publication.
//!
//! One [`Publisher`] drives one run through
//! `Created → Populated → Published → Cleaned`:
//!
//! 1. **Created**: a fresh index named after the [`IndexVersion`]. If that
//!    name already exists the run has nothing to do.
//! 2. **Populated**: every document is written by id. A failed write is
//!    recorded as a [`SkipReason`] and the remaining documents continue.
//! 3. **Published**: the alias is bound to the new index before anything
//!    old is touched, so it never resolves to zero indices.
//! 4. **Cleaned**: every previously bound index is unbound and deleted.
//!    Each step is best-effort; failures are logged and reported.
//!
//! A run that stops before `Published` leaves the alias on the old index.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::models::{DocumentOutcome, IndexVersion, SkipReason};
use crate::schema::IndexSchema;
use crate::store::DocumentStore;

/// Publication phase of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PublishState {
    Pending = 0,
    Created = 1,
    Populated = 2,
    Published = 3,
    Cleaned = 4,
}

impl PublishState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Created,
            2 => Self::Populated,
            3 => Self::Published,
            4 => Self::Cleaned,
            _ => Self::Pending,
        }
    }
}

/// Shared view of the publication phase, readable from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker(Arc<AtomicU8>);

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: PublishState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> PublishState {
        PublishState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// True from the end of populate until old indices are retired:
    /// interrupting now could leave the alias bound to both generations.
    pub fn commit_in_flight(&self) -> bool {
        matches!(self.get(), PublishState::Populated | PublishState::Published)
    }
}

/// Outcome of the populate phase.
#[derive(Debug, Default)]
pub struct PopulateReport {
    pub written: usize,
    pub skipped: Vec<SkipReason>,
}

/// Outcome of the publish and cleanup phases.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Previously live indices that were unbound and deleted.
    pub retired: Vec<String>,
    /// Cleanup steps that failed, as human-readable descriptions.
    pub failures: Vec<String>,
}

pub struct Publisher<'a> {
    store: &'a dyn DocumentStore,
    version: IndexVersion,
    schema: IndexSchema,
    tracker: PhaseTracker,
}

impl<'a> Publisher<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        version: IndexVersion,
        schema: IndexSchema,
        tracker: PhaseTracker,
    ) -> Self {
        Self {
            store,
            version,
            schema,
            tracker,
        }
    }

    pub fn version(&self) -> &IndexVersion {
        &self.version
    }

    pub fn state(&self) -> PublishState {
        self.tracker.get()
    }

    /// Create the target index. Returns `false` when it already exists.
    pub async fn create(&self) -> Result<bool> {
        let name = self.version.full_name();
        if self.store.index_exists(&name).await? {
            info!(index = %name, "index already exists, nothing to do");
            return Ok(false);
        }
        self.store
            .create_index(&name, &self.schema)
            .await
            .with_context(|| format!("failed to create index {}", name))?;
        self.tracker.set(PublishState::Created);
        info!(index = %name, "created index");
        Ok(true)
    }

    /// Write every document. Source-side skips pass straight through to
    /// the report.
    pub async fn populate<I>(&self, outcomes: I) -> PopulateReport
    where
        I: IntoIterator<Item = DocumentOutcome>,
    {
        let name = self.version.full_name();
        let mut report = PopulateReport::default();
        for outcome in outcomes {
            let doc = match outcome {
                Ok(doc) => doc,
                Err(reason) => {
                    warn!(index = %name, reason = %reason, "skipping document");
                    report.skipped.push(reason);
                    continue;
                }
            };
            match self.store.upsert(&name, &doc.id, &doc.to_source()).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    let reason = SkipReason::WriteFailed {
                        id: doc.id.clone(),
                        message: format!("{:#}", e),
                    };
                    warn!(index = %name, uri = %doc.uri, reason = %reason, "skipping document");
                    report.skipped.push(reason);
                }
            }
        }
        self.tracker.set(PublishState::Populated);
        info!(
            index = %name,
            written = report.written,
            skipped = report.skipped.len(),
            "populated index"
        );
        report
    }

    /// Point the alias at the new index, then retire every index it was
    /// bound to before.
    pub async fn publish(&self) -> Result<CleanupReport> {
        let name = self.version.full_name();
        let alias = self.version.prefix();

        let previous = self
            .store
            .get_alias(alias)
            .await
            .with_context(|| format!("failed to read alias {}", alias))?;

        self.store
            .put_alias(&name, alias)
            .await
            .with_context(|| format!("failed to bind alias {} to {}", alias, name))?;
        self.tracker.set(PublishState::Published);
        info!(alias, index = %name, "alias bound");

        let mut report = CleanupReport::default();
        for old in previous.into_iter().filter(|old| *old != name) {
            if let Err(e) = self.store.delete_alias(&old, alias).await {
                error!(alias, index = %old, error = %format!("{:#}", e), "failed to unbind alias");
                report
                    .failures
                    .push(format!("unbind {} from {}: {:#}", alias, old, e));
            }
            match self.store.delete_index(&old).await {
                Ok(()) => {
                    info!(index = %old, "deleted previous index");
                    report.retired.push(old);
                }
                Err(e) => {
                    error!(index = %old, error = %format!("{:#}", e), "failed to delete previous index");
                    report.failures.push(format!("delete {}: {:#}", old, e));
                }
            }
        }
        self.tracker.set(PublishState::Cleaned);
        Ok(report)
    }

    /// Drop the new index without publishing it. Best-effort.
    pub async fn discard(&self) {
        let name = self.version.full_name();
        match self.store.delete_index(&name).await {
            Ok(()) => info!(index = %name, "discarded unpublished index"),
            Err(e) => error!(index = %name, error = %format!("{:#}", e), "failed to discard index"),
        }
    }
}
