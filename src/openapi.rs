//! OpenAPI operation documents.
//!
//! Downloads a (possibly multi-file) OpenAPI specification and produces one
//! document per operation, addressed as `{base_path}#operation/{operationId}`
//! so search results link straight into the rendered API reference.
//!
//! `$ref`s are followed lazily, only for the parts read here, both within a
//! file (`#/responses/NotFound`) and across downloaded files
//! (`definitions.yaml#/responses/NotFound`). Files are matched by base name.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::OpenApiSettings;
use crate::frontmatter::{value_as_text, yaml_to_json};
use crate::http::{send_with_retry, RetryPolicy};
use crate::markup::markdown_to_text;
use crate::models::{default_date, Document, DocumentOutcome, SkipReason};

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Longest `$ref` chain followed before giving up (guards against cycles).
const MAX_REF_HOPS: usize = 32;

/// A parsed set of specification files; the first one is the entry point.
#[derive(Debug)]
pub struct SpecSet {
    root: String,
    files: HashMap<String, Value>,
}

impl SpecSet {
    /// Parse `(file name, YAML or JSON source)` pairs.
    pub fn parse(sources: Vec<(String, String)>) -> Result<Self> {
        let root = sources
            .first()
            .map(|(name, _)| base_name(name).to_string())
            .ok_or_else(|| anyhow!("no API spec files given"))?;
        let mut files = HashMap::new();
        for (name, raw) in sources {
            let parsed: serde_yaml::Value = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse API spec {}", name))?;
            files.insert(base_name(&name).to_string(), yaml_to_json(parsed));
        }
        Ok(Self { root, files })
    }

    /// Follow `value`'s `$ref` chain, returning the target and the file it
    /// lives in.
    fn resolve<'a>(&'a self, mut value: &'a Value, mut file: &'a str) -> Result<(&'a Value, &'a str)> {
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
                return Ok((value, file));
            };
            let (target_file, pointer) = reference.split_once('#').unwrap_or((reference, ""));
            let target_file = if target_file.is_empty() {
                file
            } else {
                base_name(target_file)
            };
            let (key, doc) = self
                .files
                .get_key_value(target_file)
                .ok_or_else(|| anyhow!("$ref {} points to unknown file {}", reference, target_file))?;
            value = doc
                .pointer(pointer)
                .ok_or_else(|| anyhow!("$ref {} does not resolve", reference))?;
            file = key.as_str();
        }
        bail!("$ref chain longer than {} hops", MAX_REF_HOPS)
    }

    /// One outcome per operation under `paths`, in path order.
    pub fn operation_documents(&self, base_path: &str) -> Result<Vec<DocumentOutcome>> {
        let root = self
            .files
            .get(&self.root)
            .ok_or_else(|| anyhow!("missing root spec {}", self.root))?;
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("API spec {} has no paths", self.root))?;

        let mut outcomes = Vec::new();
        for (path, item) in paths {
            let (item, file) = match self.resolve(item, &self.root) {
                Ok(resolved) => resolved,
                Err(e) => {
                    outcomes.push(Err(SkipReason::InvalidRecord {
                        label: path.clone(),
                        message: e.to_string(),
                    }));
                    continue;
                }
            };
            let Some(operations) = item.as_object() else {
                continue;
            };
            for method in HTTP_METHODS {
                let Some(operation) = operations.get(method) else {
                    continue;
                };
                outcomes.push(
                    self.operation_document(operation, file, method, path, base_path)
                        .map_err(|e| SkipReason::InvalidRecord {
                            label: format!("{} {}", method.to_uppercase(), path),
                            message: e.to_string(),
                        }),
                );
            }
        }
        Ok(outcomes)
    }

    fn operation_document(
        &self,
        operation: &Value,
        file: &str,
        method: &str,
        path: &str,
        base_path: &str,
    ) -> Result<Document> {
        let (operation, file) = self.resolve(operation, file)?;
        let operation_id = operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("operation has no operationId"))?;

        let summary = operation.get("summary").map(value_as_text).unwrap_or_default();
        let title = format!("{} - {} {}", summary, method.to_uppercase(), path);

        let mut body = format!("The {} API operation\n\n", operation_id);
        if let Some(description) = operation.get("description").and_then(Value::as_str) {
            body.push_str(&markdown_to_text(description));
        }
        if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
            for response in responses.values() {
                let (response, _) = self.resolve(response, file)?;
                let description = response
                    .get("description")
                    .map(value_as_text)
                    .unwrap_or_default();
                body.push_str("\n- ");
                body.push_str(&description);
            }
        }

        let anchor = format!("#operation/{}", operation_id);
        let uri = format!("{}{}", base_path, anchor);
        let mut breadcrumb: Vec<String> = base_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        breadcrumb.push(anchor);

        Ok(Document {
            id: uri.clone(),
            uri,
            text: format!("{}\n\n{}", title, body),
            title,
            breadcrumb,
            body: Some(body),
            date: default_date(),
            image_uri: None,
            extra: Map::new(),
        })
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Downloads the configured spec files and turns them into documents.
pub struct OpenApiSource {
    settings: OpenApiSettings,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenApiSource {
    pub fn new(settings: OpenApiSettings, client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            settings,
            client,
            policy,
        }
    }

    pub async fn fetch_documents(&self) -> Result<Vec<DocumentOutcome>> {
        let mut sources = Vec::with_capacity(self.settings.spec_files.len());
        for name in &self.settings.spec_files {
            let url = format!("{}/{}", self.settings.base_uri, name.trim_start_matches('/'));
            info!(url = %url, "downloading API spec");
            let response = send_with_retry(&format!("download {}", name), &self.policy, || {
                self.client.get(&url)
            })
            .await?;
            let raw = response
                .text()
                .await
                .with_context(|| format!("failed to read API spec {}", url))?;
            sources.push((name.clone(), raw));
        }

        let specs = SpecSet::parse(sources)?;
        let documents = specs.operation_documents(&self.settings.base_path)?;
        info!(operations = documents.len(), "collected API operations");
        Ok(documents)
    }
}
