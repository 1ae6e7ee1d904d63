//! Content source abstraction.
//!
//! The pipeline in [`crate::ingest`] is written once against
//! [`ContentSource`]; each kind of content is an adapter:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                ContentSource                  │
//! │  ┌────────────┐ ┌──────────────┐ ┌──────────┐ │
//! │  │ TreeSource │ │ GitDocsSource│ │BlogSource│ │
//! │  │ local tree │ │ GitHub+OpenAPI│ │ Hubspot  │ │
//! │  └────────────┘ └──────────────┘ └──────────┘ │
//! └──────────────────────┬────────────────────────┘
//!                        ▼
//!          run_pipeline() → DocumentStore
//! ```
//!
//! # Example
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use docs_indexer::traits::{ContentSource, Fetched};
//!
//! pub struct EmptySource;
//!
//! #[async_trait]
//! impl ContentSource for EmptySource {
//!     fn name(&self) -> &str { "empty" }
//!
//!     async fn fetch(&self) -> Result<Fetched> {
//!         Ok(Fetched { version_token: "v1".to_string(), documents: vec![] })
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DocumentOutcome;

/// Everything a source produced for one run.
#[derive(Debug)]
pub struct Fetched {
    /// Suffix for the index name: a commit id or a timestamp.
    pub version_token: String,
    /// One outcome per discovered item, in discovery order.
    pub documents: Vec<DocumentOutcome>,
}

/// A producer of documents for one index.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short name used in logs (e.g. `"docs"`, `"blog"`).
    fn name(&self) -> &str;

    /// Cheaply determine the version token without fetching content.
    ///
    /// Sources with content-addressed versions return `Some` so an already
    /// indexed version can be recognized before any expensive work.
    /// Sources versioned by wall clock keep the default.
    async fn probe_version(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Fetch all content.
    ///
    /// An `Err` means the source as a whole is unavailable and the run must
    /// stop before any index is created. Problems with individual items are
    /// reported inside [`Fetched::documents`].
    async fn fetch(&self) -> Result<Fetched>;
}
