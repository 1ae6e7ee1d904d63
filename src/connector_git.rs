//! GitHub documentation source.
//!
//! Workflow:
//! 1. Ask the GitHub API for the branch head commit (cheap version probe).
//! 2. Clone the repository with full history into a cache directory, or
//!    fetch and hard-reset an existing clone.
//! 3. Derive last-modified dates for every Markdown file from one pass over
//!    `git log`.
//! 4. Scan the tree (see [`crate::connector_fs::scan_tree`]) and append
//!    OpenAPI operation documents when configured.
//!
//! Git runs as a subprocess, so `git` must be on `PATH`.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::assembler::LastModified;
use crate::config::GitHubSettings;
use crate::connector_fs::scan_tree;
use crate::http::{send_with_retry, RetryPolicy};
use crate::locator::LocatorOptions;
use crate::models::DocumentOutcome;
use crate::openapi::OpenApiSource;
use crate::traits::{ContentSource, Fetched};

/// Marker prefixed to each commit header in `git log` output.
const COMMIT_MARKER: &str = "__commit__ ";

pub struct GitDocsSource {
    name: String,
    checkout: Checkout,
    client: reqwest::Client,
    policy: RetryPolicy,
    openapi: Option<OpenApiSource>,
}

/// Everything the blocking clone-and-scan step needs.
#[derive(Debug, Clone)]
struct Checkout {
    github: GitHubSettings,
    clone_url: String,
    subfolder: Option<String>,
    options: LocatorOptions,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

impl GitDocsSource {
    pub fn new(
        name: &str,
        github: GitHubSettings,
        subfolder: Option<String>,
        options: LocatorOptions,
        client: reqwest::Client,
        policy: RetryPolicy,
        openapi: Option<OpenApiSource>,
    ) -> Self {
        let clone_url = github_clone_url(&github.handle, github.token.as_deref());
        Self {
            name: name.to_string(),
            checkout: Checkout {
                github,
                clone_url,
                subfolder,
                options,
            },
            client,
            policy,
            openapi,
        }
    }

    /// Clone from somewhere other than github.com (mirrors, tests).
    pub fn with_clone_url(mut self, url: &str) -> Self {
        self.checkout.clone_url = url.to_string();
        self
    }

    /// Local clone location, stable per repository handle.
    pub fn cache_dir(&self) -> PathBuf {
        self.checkout.cache_dir()
    }
}

impl Checkout {
    fn cache_dir(&self) -> PathBuf {
        self.github
            .workdir
            .join("gitcache")
            .join(short_hash(&self.github.handle))
    }

    /// Bring the clone up to date, then scan it.
    fn run(&self) -> Result<(String, Vec<DocumentOutcome>)> {
        let cache_dir = self.cache_dir();
        let secret = self.github.token.as_deref();
        info!(
            repository = %self.github.handle,
            branch = %self.github.branch,
            path = %cache_dir.display(),
            "updating repository clone"
        );

        if cache_dir.join(".git").exists() {
            if let Err(e) = git_pull(&cache_dir, &self.github.branch) {
                warn!(
                    error = %redact(&format!("{:#}", e), secret),
                    "updating cached clone failed, cloning again"
                );
                std::fs::remove_dir_all(&cache_dir).with_context(|| {
                    format!("Failed to remove stale clone: {}", cache_dir.display())
                })?;
                git_clone(&self.clone_url, &self.github.branch, &cache_dir, secret)?;
            }
        } else {
            if cache_dir.exists() {
                std::fs::remove_dir_all(&cache_dir).with_context(|| {
                    format!("Failed to remove incomplete clone: {}", cache_dir.display())
                })?;
            }
            git_clone(&self.clone_url, &self.github.branch, &cache_dir, secret)?;
        }

        let sha = git_head_sha(&cache_dir)?;
        let last_modified = last_modified_map(&cache_dir)?;
        info!(sha = %sha, files = last_modified.len(), "repository checked out");

        let documents = scan_tree(
            &cache_dir,
            self.subfolder.as_deref(),
            &self.options,
            &last_modified,
        )?;
        Ok((sha, documents))
    }
}

#[async_trait]
impl ContentSource for GitDocsSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe_version(&self) -> Result<Option<String>> {
        let github = &self.checkout.github;
        let url = format!(
            "{}/repos/{}/commits/{}",
            github.api_url, github.handle, github.branch
        );
        let response = send_with_retry("GitHub commit lookup", &self.policy, || {
            let request = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github+json");
            match &github.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        })
        .await?;
        let commit: CommitResponse = response
            .json()
            .await
            .context("unexpected GitHub commit response")?;
        info!(repository = %github.handle, sha = %commit.sha, "latest commit");
        Ok(Some(commit.sha))
    }

    async fn fetch(&self) -> Result<Fetched> {
        let checkout = self.checkout.clone();
        let (version_token, mut documents) =
            tokio::task::spawn_blocking(move || checkout.run()).await??;

        if let Some(openapi) = &self.openapi {
            documents.extend(openapi.fetch_documents().await?);
        }

        Ok(Fetched {
            version_token,
            documents,
        })
    }
}

/// HTTPS clone URL for a GitHub `owner/name` handle.
pub fn github_clone_url(handle: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => format!("https://x-access-token:{}@github.com/{}.git", token, handle),
        None => format!("https://github.com/{}.git", handle),
    }
}

fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
        _ => text.to_string(),
    }
}

fn git_clone(url: &str, branch: &str, dest: &Path, secret: Option<&str>) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create cache directory: {}", dest.display()))?;

    let output = Command::new("git")
        .args(["clone", "--quiet", "--branch", branch, "--single-branch"])
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", redact(stderr.trim(), secret));
    }

    Ok(())
}

fn git_pull(repo_dir: &Path, branch: &str) -> Result<()> {
    let output = Command::new("git")
        .args(["fetch", "--quiet", "origin", branch])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git fetch'")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git fetch failed: {}", stderr.trim());
    }

    let output = Command::new("git")
        .args(["reset", "--quiet", "--hard", "FETCH_HEAD"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git reset'")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git reset failed: {}", stderr.trim());
    }

    Ok(())
}

/// Full commit id of `HEAD` in `repo_dir`.
pub fn git_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to get HEAD SHA")?;

    if !output.status.success() {
        bail!("git rev-parse HEAD failed in {}", repo_dir.display());
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        bail!("git rev-parse HEAD returned nothing in {}", repo_dir.display());
    }
    Ok(sha)
}

/// Last commit time of every Markdown file in the repository at `repo_dir`,
/// keyed by repository-relative path.
pub fn last_modified_map(repo_dir: &Path) -> Result<LastModified> {
    let output = Command::new("git")
        .args(["-c", "core.quotepath=off", "log", "--name-only"])
        .arg(format!("--format={}%ct", COMMIT_MARKER))
        .args(["--", "*.md"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git log'")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git log failed: {}", stderr.trim());
    }

    parse_git_log(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `git log --name-only` output (newest commit first). The first
/// commit seen for a path is its latest change.
pub fn parse_git_log(log: &str) -> Result<LastModified> {
    let mut map = LastModified::new();
    let mut current: Option<DateTime<Utc>> = None;
    for line in log.lines() {
        if let Some(ts) = line.strip_prefix(COMMIT_MARKER) {
            let secs: i64 = ts
                .trim()
                .parse()
                .with_context(|| format!("bad commit timestamp '{}'", ts))?;
            current = Some(
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| anyhow!("commit timestamp out of range: {}", secs))?,
            );
            continue;
        }
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        if let Some(when) = current {
            map.entry(path.to_string()).or_insert(when);
        }
    }
    Ok(map)
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}
