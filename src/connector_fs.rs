//! File-tree content source.
//!
//! Turns a checked-out documentation tree into documents:
//! locate pages, read each file, split front matter, assemble. Each page is
//! independent; a page that cannot be read becomes a [`SkipReason`] and the
//! scan continues. Only a failure of the walk itself aborts the scan.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::assembler::{assemble, LastModified};
use crate::connector_git::{git_head_sha, last_modified_map};
use crate::frontmatter;
use crate::locator::{LocatorOptions, PageLocator};
use crate::models::{timestamp_token, DocumentOutcome, PageRecord, SkipReason};
use crate::openapi::OpenApiSource;
use crate::traits::{ContentSource, Fetched};

/// Scan `repo_root` (optionally below `subfolder`) into document outcomes.
pub fn scan_tree(
    repo_root: &Path,
    subfolder: Option<&str>,
    options: &LocatorOptions,
    last_modified: &LastModified,
) -> Result<Vec<DocumentOutcome>> {
    let locator = PageLocator::new(repo_root, subfolder, options.clone())?;
    let mut outcomes = Vec::new();
    for page in locator.locate() {
        let page = page?;
        outcomes.push(page_to_document(&page, last_modified));
    }
    info!(
        root = %locator.scan_root().display(),
        pages = outcomes.len(),
        "scanned content tree"
    );
    Ok(outcomes)
}

fn page_to_document(page: &PageRecord, last_modified: &LastModified) -> DocumentOutcome {
    let path = &page.source.path;
    let bytes = std::fs::read(path).map_err(|source| SkipReason::Unreadable {
        path: path.clone(),
        source,
    })?;
    let raw = String::from_utf8(bytes).map_err(|_| SkipReason::NotUtf8 { path: path.clone() })?;
    let front_matter = frontmatter::parse(&raw, &path.display().to_string());
    debug!(uri = %page.uri, "assembled page");
    Ok(assemble(page, &front_matter, last_modified))
}

/// An already checked-out tree, as set with `REPOSITORY_PATH`.
///
/// If the tree is a git work tree, its `HEAD` commit is the version token
/// and page dates come from history. Otherwise every run gets a timestamp
/// token and pages carry the default date.
pub struct TreeSource {
    name: String,
    repo_root: PathBuf,
    subfolder: Option<String>,
    options: LocatorOptions,
    openapi: Option<OpenApiSource>,
}

impl TreeSource {
    pub fn new(
        name: &str,
        repo_root: PathBuf,
        subfolder: Option<String>,
        options: LocatorOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            repo_root,
            subfolder,
            options,
            openapi: None,
        }
    }

    /// Append OpenAPI operation documents to every fetch.
    pub fn with_openapi(mut self, openapi: OpenApiSource) -> Self {
        self.openapi = Some(openapi);
        self
    }
}

fn is_git_repo(root: &Path) -> bool {
    root.join(".git").exists()
}

#[async_trait]
impl ContentSource for TreeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe_version(&self) -> Result<Option<String>> {
        if !is_git_repo(&self.repo_root) {
            return Ok(None);
        }
        let root = self.repo_root.clone();
        let sha = tokio::task::spawn_blocking(move || git_head_sha(&root)).await??;
        Ok(Some(sha))
    }

    async fn fetch(&self) -> Result<Fetched> {
        let root = self.repo_root.clone();
        let subfolder = self.subfolder.clone();
        let options = self.options.clone();
        let mut fetched = tokio::task::spawn_blocking(move || -> Result<Fetched> {
            let (version_token, last_modified) = if is_git_repo(&root) {
                let sha = git_head_sha(&root)?;
                let dates = last_modified_map(&root).unwrap_or_else(|e| {
                    warn!(error = %format!("{:#}", e), "could not read git history, using default dates");
                    LastModified::new()
                });
                (sha, dates)
            } else {
                (timestamp_token(Utc::now()), LastModified::new())
            };
            let documents = scan_tree(&root, subfolder.as_deref(), &options, &last_modified)?;
            Ok(Fetched {
                version_token,
                documents,
            })
        })
        .await??;

        if let Some(openapi) = &self.openapi {
            fetched.documents.extend(openapi.fetch_documents().await?);
        }
        Ok(fetched)
    }
}
