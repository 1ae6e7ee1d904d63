//! Core data models used throughout the indexer.
//!
//! These types represent the pages, parsed front matter, and documents that
//! flow from a content source through assembly into a versioned index.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Separator between an index name prefix and its version token.
pub const VERSION_SEPARATOR: char = '-';

/// Date used when a source provides no published/last-modified date.
pub fn default_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Where the raw text of a page lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Physical path of the file.
    pub path: PathBuf,
    /// Path relative to the repository root, `/`-separated. Used as the key
    /// into the last-modified map.
    pub relative: String,
}

/// A logical page discovered in a content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub path_segments: Vec<String>,
    pub uri: String,
    pub source: SourceLocation,
}

/// Result of separating front matter from a document body.
///
/// Both halves are `None` when no fence was found or the metadata could not
/// be parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub metadata: Option<Map<String, Value>>,
    pub body: Option<String>,
}

impl FrontMatter {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.metadata.is_none() && self.body.is_none()
    }
}

/// The canonical indexable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Primary key in the index. Equal to `uri` for pages.
    pub id: String,
    pub uri: String,
    pub title: String,
    pub breadcrumb: Vec<String>,
    pub body: Option<String>,
    /// Catch-all full-text field.
    pub text: String,
    pub date: DateTime<Utc>,
    pub image_uri: Option<String>,
    /// Additional front-matter fields carried through unchanged.
    pub extra: Map<String, Value>,
}

impl Document {
    /// Positional breadcrumb fields, `breadcrumb_1` first.
    pub fn breadcrumb_fields(&self) -> Vec<(String, String)> {
        self.breadcrumb
            .iter()
            .enumerate()
            .map(|(i, segment)| (format!("breadcrumb_{}", i + 1), segment.clone()))
            .collect()
    }

    /// Render the document as the JSON body sent to the store.
    ///
    /// Extra metadata goes first so the computed fields always win.
    pub fn to_source(&self) -> Value {
        let mut source = self.extra.clone();
        source.insert("uri".to_string(), Value::String(self.uri.clone()));
        source.insert("title".to_string(), Value::String(self.title.clone()));
        source.insert(
            "breadcrumb".to_string(),
            Value::Array(
                self.breadcrumb
                    .iter()
                    .map(|s| Value::String(s.clone()))
                    .collect(),
            ),
        );
        for (field, segment) in self.breadcrumb_fields() {
            source.insert(field, Value::String(segment));
        }
        source.insert(
            "body".to_string(),
            self.body.clone().map(Value::String).unwrap_or(Value::Null),
        );
        source.insert("text".to_string(), Value::String(self.text.clone()));
        source.insert(
            "date".to_string(),
            Value::String(self.date.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        if let Some(image) = &self.image_uri {
            source.insert("image_uri".to_string(), Value::String(image.clone()));
        }
        Value::Object(source)
    }
}

/// Why a single document was left out of a run.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },

    #[error("invalid record {label}: {message}")]
    InvalidRecord { label: String, message: String },

    #[error("write of {id} failed: {message}")]
    WriteFailed { id: String, message: String },
}

/// Per-document outcome produced by a content source.
pub type DocumentOutcome = std::result::Result<Document, SkipReason>;

/// A version-qualified index name: `{prefix}-{token}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexVersion {
    prefix: String,
    token: String,
}

impl IndexVersion {
    pub fn new(prefix: &str, token: &str) -> anyhow::Result<Self> {
        if prefix.is_empty() {
            anyhow::bail!("index name prefix must not be empty");
        }
        if prefix.contains(VERSION_SEPARATOR) {
            anyhow::bail!(
                "index name prefix '{}' must not contain '{}'",
                prefix,
                VERSION_SEPARATOR
            );
        }
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("index version token must not be empty");
        }
        Ok(Self {
            prefix: prefix.to_string(),
            token: token.to_lowercase(),
        })
    }

    /// Version derived from the wall clock, e.g. `blog-2024-03-01-12-30-00-000000`.
    pub fn timestamped(prefix: &str, at: DateTime<Utc>) -> anyhow::Result<Self> {
        Self::new(prefix, &timestamp_token(at))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn full_name(&self) -> String {
        format!("{}{}{}", self.prefix, VERSION_SEPARATOR, self.token)
    }
}

impl std::fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// UTC wall-clock token with microseconds, so back-to-back runs get
/// distinct index names.
pub fn timestamp_token(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d-%H-%M-%S-%6f").to_string()
}
