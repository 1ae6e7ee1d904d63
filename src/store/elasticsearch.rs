//! Elasticsearch [`DocumentStore`] over the REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | index exists | `HEAD /{index}` |
//! | create index | `PUT /{index}` with `{settings, mappings}` |
//! | upsert | `PUT /{index}/_doc/{id}` |
//! | read alias | `GET /_alias/{alias}` (404 = unbound) |
//! | bind alias | `PUT /{index}/_alias/{alias}` |
//! | unbind alias | `DELETE /{index}/_alias/{alias}` |
//! | delete index | `DELETE /{index}` |
//!
//! Path segments are percent-encoded, so document ids such as `/a/b/` are
//! safe to use verbatim.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::DocumentStore;
use crate::http::{send_accepting, send_with_retry, RetryPolicy};
use crate::schema::IndexSchema;

pub struct ElasticsearchStore {
    client: Client,
    base: Url,
    api_key: Option<String>,
    policy: RetryPolicy,
}

impl ElasticsearchStore {
    pub fn new(
        client: Client,
        endpoint: &str,
        api_key: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let base = Url::parse(endpoint)
            .with_context(|| format!("invalid Elasticsearch endpoint '{}'", endpoint))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("invalid Elasticsearch endpoint '{}'", endpoint);
        }
        Ok(Self {
            client,
            base,
            api_key,
            policy,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("endpoint {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("ApiKey {}", key)),
            None => builder,
        }
    }
}

fn ok_or_not_found(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.url(&[index])?;
        let response = send_accepting(
            &format!("HEAD {}", index),
            &self.policy,
            ok_or_not_found,
            || self.request(Method::HEAD, &url),
        )
        .await?;
        Ok(response.status().is_success())
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        let url = self.url(&[index])?;
        let body = schema.to_body();
        send_with_retry(&format!("create index {}", index), &self.policy, || {
            self.request(Method::PUT, &url).json(&body)
        })
        .await?;
        Ok(())
    }

    async fn upsert(&self, index: &str, id: &str, source: &Value) -> Result<()> {
        let url = self.url(&[index, "_doc", id])?;
        send_with_retry(&format!("index document {}", id), &self.policy, || {
            self.request(Method::PUT, &url).json(source)
        })
        .await?;
        debug!(index, id, "document written");
        Ok(())
    }

    async fn get_alias(&self, alias: &str) -> Result<Vec<String>> {
        let url = self.url(&["_alias", alias])?;
        let response = send_accepting(
            &format!("get alias {}", alias),
            &self.policy,
            ok_or_not_found,
            || self.request(Method::GET, &url),
        )
        .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("invalid alias response for {}", alias))?;
        let mut indices: Vec<String> = body
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        indices.sort();
        Ok(indices)
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        let url = self.url(&[index, "_alias", alias])?;
        send_with_retry(&format!("bind alias {} => {}", alias, index), &self.policy, || {
            self.request(Method::PUT, &url)
        })
        .await?;
        Ok(())
    }

    async fn delete_alias(&self, index: &str, alias: &str) -> Result<()> {
        let url = self.url(&[index, "_alias", alias])?;
        send_with_retry(&format!("unbind alias {} => {}", alias, index), &self.policy, || {
            self.request(Method::DELETE, &url)
        })
        .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let url = self.url(&[index])?;
        send_with_retry(&format!("delete index {}", index), &self.policy, || {
            self.request(Method::DELETE, &url)
        })
        .await?;
        Ok(())
    }
}
