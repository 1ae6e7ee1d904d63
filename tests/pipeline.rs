use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use docs_indexer::connector_fs::TreeSource;
use docs_indexer::ingest::{run_pipeline, RunOutcome};
use docs_indexer::locator::LocatorOptions;
use docs_indexer::models::SkipReason;
use docs_indexer::publisher::{PhaseTracker, PublishState};
use docs_indexer::schema::IndexSchema;
use docs_indexer::store::memory::InMemoryStore;
use docs_indexer::store::DocumentStore;

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "content/basics/_index.md",
        b"+++\ntitle = \"Basics\"\ndescription = \"Getting started\"\n+++\n\nStart here.\n",
    );
    write(
        root,
        "content/basics/nodepools.md",
        b"---\ntitle: Node Pools\ndescription: Pools of worker nodes\nweight: 10\n---\n\nThis is the YAML example's text\n",
    );
    write(root, "content/basics/broken.md", &[0xc3, 0x28, 0x0a]);
    write(root, "README.md", b"# not part of the site\n");
    tmp
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=Indexer", "-c", "user.email=indexer@example.com"])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

fn source(root: &Path) -> TreeSource {
    TreeSource::new(
        "docs",
        root.to_path_buf(),
        Some("content".to_string()),
        LocatorOptions::default(),
    )
}

async fn run(source: &TreeSource, store: &dyn DocumentStore) -> RunOutcome {
    run_pipeline(source, store, "docs", IndexSchema::docs(), PhaseTracker::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_tree_is_published_behind_alias() {
    let site = setup_site();
    let store = InMemoryStore::new();

    let RunOutcome::Published(summary) = run(&source(site.path()), &store).await else {
        panic!("expected a published run");
    };
    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert!(matches!(summary.skipped[0], SkipReason::NotUtf8 { .. }));

    let live = store.get_alias("docs").await.unwrap();
    assert_eq!(live, vec![summary.index.clone()]);
    assert_eq!(store.doc_count(&summary.index), Some(summary.written));

    let ids: HashSet<String> = store.document_ids(&summary.index).into_iter().collect();
    let expected: HashSet<String> = ["/basics/", "/basics/nodepools/"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(ids, expected);

    let page = store.document(&summary.index, "/basics/nodepools/").unwrap();
    assert_eq!(page["title"], "Node Pools");
    assert_eq!(page["description"], "Pools of worker nodes");
    assert_eq!(page["breadcrumb_1"], "basics");
    assert_eq!(page["body"], "This is the YAML example's text");
    assert_eq!(store.schema(&summary.index), Some(IndexSchema::docs()));
}

#[tokio::test]
async fn test_git_tree_is_indexed_once_per_commit() {
    if !git_available() {
        return;
    }
    let site = setup_site();
    git(site.path(), &["init", "--quiet"]);
    git(site.path(), &["add", "."]);
    git(site.path(), &["commit", "--quiet", "-m", "initial"]);

    let store = InMemoryStore::new();
    let tree = source(site.path());
    let RunOutcome::Published(first) = run(&tree, &store).await else {
        panic!("expected a published run");
    };

    let tracker = PhaseTracker::new();
    let again = run_pipeline(&tree, &store, "docs", IndexSchema::docs(), tracker.clone())
        .await
        .unwrap();
    assert!(matches!(again, RunOutcome::AlreadyIndexed { ref index } if *index == first.index));
    assert_eq!(tracker.get(), PublishState::Pending);

    write(site.path(), "content/basics/new.md", b"---\ntitle: New\n---\nnew page\n");
    git(site.path(), &["add", "."]);
    git(site.path(), &["commit", "--quiet", "-m", "add page"]);

    let RunOutcome::Published(second) = run(&tree, &store).await else {
        panic!("expected a published run");
    };
    assert_ne!(second.index, first.index);
    assert_eq!(second.retired, vec![first.index.clone()]);
    assert_eq!(store.indices(), vec![second.index.clone()]);
    assert_eq!(store.get_alias("docs").await.unwrap(), vec![second.index.clone()]);
    assert_eq!(store.doc_count(&second.index), Some(3));
}

/// Rejects writes for one document id.
struct RejectingStore {
    inner: InMemoryStore,
    reject_id: &'static str,
}

#[async_trait]
impl DocumentStore for RejectingStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.inner.index_exists(index).await
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        self.inner.create_index(index, schema).await
    }

    async fn upsert(&self, index: &str, id: &str, source: &Value) -> Result<()> {
        if id == self.reject_id {
            bail!("mapper_parsing_exception");
        }
        self.inner.upsert(index, id, source).await
    }

    async fn get_alias(&self, alias: &str) -> Result<Vec<String>> {
        self.inner.get_alias(alias).await
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        self.inner.put_alias(index, alias).await
    }

    async fn delete_alias(&self, index: &str, alias: &str) -> Result<()> {
        self.inner.delete_alias(index, alias).await
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.inner.delete_index(index).await
    }
}

#[tokio::test]
async fn test_failed_write_is_skipped_and_run_still_publishes() {
    let site = setup_site();
    let store = RejectingStore {
        inner: InMemoryStore::new(),
        reject_id: "/basics/",
    };

    let RunOutcome::Published(summary) = run(&source(site.path()), &store).await else {
        panic!("expected a published run");
    };
    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary
        .skipped
        .iter()
        .any(|s| matches!(s, SkipReason::WriteFailed { id, .. } if id == "/basics/")));
    assert_eq!(store.inner.doc_count(&summary.index), Some(1));
    assert_eq!(
        store.get_alias("docs").await.unwrap(),
        vec![summary.index.clone()]
    );
}

#[tokio::test]
async fn test_tree_with_only_unreadable_pages_publishes_nothing() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "content/bad.md", &[0xff, 0xfe]);
    let store = InMemoryStore::new();

    let outcome = run(&source(tmp.path()), &store).await;
    assert!(matches!(outcome, RunOutcome::NothingToPublish { .. }));
    assert!(store.indices().is_empty());
    assert!(store.get_alias("docs").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_tree_runs_get_distinct_generations() {
    let site = setup_site();
    let store = InMemoryStore::new();
    let tree = source(site.path());

    let RunOutcome::Published(first) = run(&tree, &store).await else {
        panic!("expected a published run");
    };
    let RunOutcome::Published(second) = run(&tree, &store).await else {
        panic!("back-to-back run should publish a new generation");
    };

    assert_ne!(first.index, second.index);
    assert_eq!(second.retired, vec![first.index.clone()]);
    assert_eq!(store.indices(), vec![second.index.clone()]);
    assert_eq!(store.get_alias("docs").await.unwrap(), vec![second.index.clone()]);
    assert_eq!(store.doc_count(&second.index), Some(first.written));
}
