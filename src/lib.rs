//! # docs-indexer
//!
//! Builds search indexes for a documentation site and a blog, publishing
//! each new generation with a blue-green alias swap so readers never see a
//! half-built index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐   ┌────────────────┐
//! │ Content sources  │──▶│ Locate → Parse →  │──▶│   Publisher    │
//! │ Git/Tree/Hubspot │   │ Assemble          │   │ create/populate│
//! │ + OpenAPI        │   └───────────────────┘   │ alias swap     │
//! └──────────────────┘                           └───────┬────────┘
//!                                                        ▼
//!                                              ┌──────────────────┐
//!                                              │  DocumentStore   │
//!                                              │  (Elasticsearch) │
//!                                              └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ELASTICSEARCH_ENDPOINT=http://localhost:9200 REPOSITORY_PATH=./site docs-indexer docs
//! ELASTICSEARCH_ENDPOINT=http://localhost:9200 HUBSPOT_ACCESS_TOKEN=... docs-indexer blog
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration, validation |
//! | [`models`] | Core data types |
//! | [`locator`] | Markdown page discovery and URI mapping |
//! | [`frontmatter`] | TOML/YAML front matter splitting |
//! | [`markup`] | Markdown and HTML to plain text |
//! | [`assembler`] | Page → search document |
//! | [`openapi`] | One document per OpenAPI operation |
//! | [`connector_fs`] | Checked-out tree source |
//! | [`connector_git`] | GitHub repository source |
//! | [`connector_hubspot`] | Hubspot blog source |
//! | [`store`] | Index store abstraction and backends |
//! | [`schema`] | Index settings and mappings |
//! | [`publisher`] | Blue-green index publication |
//! | [`ingest`] | Run orchestration |

pub mod assembler;
pub mod config;
pub mod connector_fs;
pub mod connector_git;
pub mod connector_hubspot;
pub mod frontmatter;
pub mod http;
pub mod ingest;
pub mod locator;
pub mod markup;
pub mod models;
pub mod openapi;
pub mod publisher;
pub mod schema;
pub mod store;
pub mod traits;
