//! Storage abstraction for versioned search indexes.
//!
//! The [`DocumentStore`] trait covers everything the publisher needs from a
//! search engine: index lifecycle, per-document upserts, and alias
//! management. Backends:
//!
//! - [`elasticsearch::ElasticsearchStore`] talks to an Elasticsearch (or
//!   OpenSearch) cluster over HTTP.
//! - [`memory::InMemoryStore`] keeps everything in process, for tests and
//!   dry runs.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod elasticsearch;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::schema::IndexSchema;

/// Abstract index store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`index_exists`](DocumentStore::index_exists) | Check whether an index name is taken |
/// | [`create_index`](DocumentStore::create_index) | Create an index with settings and mappings |
/// | [`upsert`](DocumentStore::upsert) | Create or overwrite one document by id |
/// | [`get_alias`](DocumentStore::get_alias) | List indices an alias currently points to |
/// | [`put_alias`](DocumentStore::put_alias) | Point an alias at an index |
/// | [`delete_alias`](DocumentStore::delete_alias) | Remove an alias from one index |
/// | [`delete_index`](DocumentStore::delete_index) | Drop an index |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()>;

    /// Write `source` under `id`, replacing any document with the same id.
    async fn upsert(&self, index: &str, id: &str, source: &Value) -> Result<()>;

    /// Indices bound to `alias`, sorted. Empty when the alias does not exist.
    async fn get_alias(&self, alias: &str) -> Result<Vec<String>>;

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()>;

    async fn delete_alias(&self, index: &str, alias: &str) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;
}
