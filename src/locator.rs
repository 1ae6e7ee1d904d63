//! Page discovery over a content tree.
//!
//! Walks a directory tree and yields one [`PageRecord`] per Markdown file.
//! Version-control metadata and image asset directories are pruned by a
//! pure predicate before descending. An unreadable directory is an error for
//! the whole walk: skipping it would silently drop content from the index.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::models::{PageRecord, SourceLocation};

/// Extension of files considered content.
pub const CONTENT_EXTENSION: &str = "md";

/// File names that stand for their containing directory.
const INDEX_FILES: [&str; 2] = ["index.md", "_index.md"];

/// Directory names never descended into.
pub fn default_excluded_dirs() -> Vec<String> {
    vec![".git".to_string(), "img".to_string()]
}

/// Options controlling page discovery.
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    /// Directory names pruned anywhere in the tree.
    pub excluded_dirs: Vec<String>,
    /// Extra glob patterns (relative to the scan root) to leave out.
    pub exclude_globs: Vec<String>,
    /// Lower-case the whole URI.
    pub lowercase_uris: bool,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            excluded_dirs: default_excluded_dirs(),
            exclude_globs: Vec::new(),
            lowercase_uris: true,
        }
    }
}

/// Discovers pages below `repo_root`, optionally restricted to `subfolder`.
pub struct PageLocator {
    repo_root: PathBuf,
    scan_root: PathBuf,
    options: LocatorOptions,
    exclude_set: GlobSet,
}

impl PageLocator {
    pub fn new(repo_root: &Path, subfolder: Option<&str>, options: LocatorOptions) -> Result<Self> {
        let scan_root = match subfolder.map(|s| s.trim_matches('/')) {
            Some(sub) if !sub.is_empty() => repo_root.join(sub),
            _ => repo_root.to_path_buf(),
        };
        if !scan_root.is_dir() {
            anyhow::bail!("content root does not exist: {}", scan_root.display());
        }
        let exclude_set = build_globset(&options.exclude_globs)?;
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            scan_root,
            options,
            exclude_set,
        })
    }

    pub fn scan_root(&self) -> &Path {
        &self.scan_root
    }

    /// Lazily walk the tree. Calling this again restarts the walk.
    pub fn locate(&self) -> impl Iterator<Item = Result<PageRecord>> + '_ {
        WalkDir::new(&self.scan_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_excluded(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    // Linked pages count; linked directories are not descended.
                    let is_page = entry.file_type().is_file()
                        || (entry.path_is_symlink() && entry.path().is_file());
                    if is_page && has_content_extension(entry.path()) {
                        Some(self.page_record(entry.path()))
                    } else {
                        None
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    Some(Err(anyhow::Error::new(e).context(format!(
                        "failed to read content tree at {}",
                        path
                    ))))
                }
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        if entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            if self.options.excluded_dirs.iter().any(|d| *d == name) {
                return true;
            }
        }
        if self.exclude_set.is_empty() {
            return false;
        }
        match entry.path().strip_prefix(&self.scan_root) {
            Ok(relative) => self.exclude_set.is_match(relative),
            Err(_) => false,
        }
    }

    fn page_record(&self, path: &Path) -> Result<PageRecord> {
        let relative = path
            .strip_prefix(&self.scan_root)
            .with_context(|| format!("{} is outside {}", path.display(), self.scan_root.display()))?;

        let mut segments = path_components(relative.parent().unwrap_or(Path::new("")));
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !INDEX_FILES.contains(&file_name.as_str()) {
            let stem = file_name
                .strip_suffix(&format!(".{}", CONTENT_EXTENSION))
                .unwrap_or(&file_name);
            segments.push(stem.to_string());
        }

        let uri = build_uri(&segments, self.options.lowercase_uris);
        let repo_relative = path
            .strip_prefix(&self.repo_root)
            .map(|p| path_components(p).join("/"))
            .unwrap_or_else(|_| path_components(relative).join("/"));

        Ok(PageRecord {
            path_segments: segments,
            uri,
            source: SourceLocation {
                path: path.to_path_buf(),
                relative: repo_relative,
            },
        })
    }
}

/// `/` + segments joined by `/` + `/`, with doubled slashes collapsed.
pub fn build_uri(segments: &[String], lowercase: bool) -> String {
    let mut uri = format!("/{}/", segments.join("/"));
    while uri.contains("//") {
        uri = uri.replace("//", "/");
    }
    if lowercase {
        uri = uri.to_lowercase();
    }
    uri
}

fn has_content_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CONTENT_EXTENSION)
}

fn path_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{}'", pattern))?);
    }
    Ok(builder.build()?)
}
