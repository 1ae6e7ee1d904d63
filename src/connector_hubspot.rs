//! Hubspot CMS blog source.
//!
//! Pages through `GET {endpoint}/cms/v3/blogs/posts`, following
//! `paging.next.link` until it is absent. Unpublished posts are ignored;
//! posts missing required fields become [`SkipReason::InvalidRecord`].
//! Blog indexes are versioned by wall-clock time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::frontmatter::value_as_text;
use crate::http::{send_with_retry, RetryPolicy};
use crate::markup::html_to_text;
use crate::models::{timestamp_token, Document, DocumentOutcome, SkipReason};
use crate::traits::{ContentSource, Fetched};

const POSTS_PATH: &str = "/cms/v3/blogs/posts";
const PUBLISHED: &str = "PUBLISHED";
const BLOG_SEGMENT: &str = "blog";

#[derive(Debug, Deserialize)]
struct PostsPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    #[serde(default)]
    link: Option<String>,
}

impl PostsPage {
    fn next_link(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .and_then(|n| n.link.as_deref())
            .filter(|l| !l.is_empty())
    }
}

pub struct BlogSource {
    name: String,
    endpoint: String,
    access_token: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl BlogSource {
    pub fn new(
        name: &str,
        endpoint: &str,
        access_token: &str,
        client: reqwest::Client,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            client,
            policy,
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<PostsPage> {
        let response = send_with_retry("Hubspot blog posts", &self.policy, || {
            self.client
                .get(url.clone())
                .header("Accept", "application/json")
                .bearer_auth(&self.access_token)
        })
        .await?;
        response
            .json()
            .await
            .with_context(|| format!("unexpected Hubspot response from {}", url))
    }
}

#[async_trait]
impl ContentSource for BlogSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Fetched> {
        let version_token = timestamp_token(Utc::now());
        let first = format!("{}{}", self.endpoint, POSTS_PATH);
        let mut url = Url::parse(&first).with_context(|| format!("invalid Hubspot URL {}", first))?;

        let mut documents = Vec::new();
        let mut unpublished = 0usize;
        let mut pages = 0usize;
        loop {
            let page = self.fetch_page(&url).await?;
            pages += 1;
            for post in &page.results {
                if post.get("state").and_then(Value::as_str) != Some(PUBLISHED) {
                    unpublished += 1;
                    continue;
                }
                documents.push(parse_blog_post(post));
            }

            let Some(link) = page.next_link() else {
                break;
            };
            let next = url
                .join(link)
                .with_context(|| format!("invalid paging link {}", link))?;
            if next == url {
                warn!(url = %next, "paging link points to the current page, stopping");
                break;
            }
            debug!(url = %next, "following paging link");
            url = next;
        }

        info!(
            pages,
            posts = documents.len(),
            unpublished,
            "fetched blog posts"
        );
        Ok(Fetched {
            version_token,
            documents,
        })
    }
}

/// Build a document from one post record as returned by the API.
pub fn parse_blog_post(post: &Value) -> DocumentOutcome {
    let id = post
        .get("id")
        .filter(|v| !v.is_null())
        .map(value_as_text)
        .filter(|id| !id.is_empty());
    let Some(id) = id else {
        return Err(invalid("<unknown>", "post has no id"));
    };
    let Some(uri) = post.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()) else {
        return Err(invalid(&id, "post has no url"));
    };
    let Some(created) = post.get("created").and_then(Value::as_str) else {
        return Err(invalid(&id, "post has no created date"));
    };
    let date = parse_date(created).ok_or_else(|| invalid(&id, &format!("unparseable date '{}'", created)))?;

    let html_field = |name: &str| {
        post.get(name)
            .and_then(Value::as_str)
            .map(|html| html_to_text(html).trim().to_string())
            .unwrap_or_default()
    };
    let title = html_field("htmlTitle");
    let body = html_field("postBody");
    let image_uri = post
        .get("featuredImage")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Document {
        id,
        uri: uri.to_string(),
        text: format!("{}\n\n{}", title, body),
        title,
        breadcrumb: vec![BLOG_SEGMENT.to_string()],
        body: Some(body),
        date,
        image_uri,
        extra: Map::new(),
    })
}

fn invalid(label: &str, message: &str) -> SkipReason {
    SkipReason::InvalidRecord {
        label: label.to_string(),
        message: message.to_string(),
    }
}

/// RFC 3339, or a bare `Z` timestamp with or without fractional seconds.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(id: &str, state: &str) -> Value {
        json!({
            "id": id,
            "state": state,
            "url": format!("https://www.example.com/blog/{}", id),
            "created": "2021-03-04T05:06:07.890Z",
            "htmlTitle": "Hello &amp; <b>welcome</b>",
            "postBody": "<p>First paragraph.</p><p>Second.</p>",
            "featuredImage": "https://cdn.example.com/img.png"
        })
    }

    #[test]
    fn test_parse_blog_post() {
        let doc = parse_blog_post(&post("42", PUBLISHED)).unwrap();
        assert_eq!(doc.id, "42");
        assert_eq!(doc.uri, "https://www.example.com/blog/42");
        assert_eq!(doc.title, "Hello & welcome");
        assert_eq!(doc.body.as_deref(), Some("First paragraph.Second."));
        assert_eq!(doc.text, "Hello & welcome\n\nFirst paragraph.Second.");
        assert_eq!(doc.breadcrumb, vec!["blog"]);
        assert_eq!(doc.image_uri.as_deref(), Some("https://cdn.example.com/img.png"));
        assert_eq!(doc.to_source()["breadcrumb_1"], "blog");
        assert_eq!(doc.date.timestamp(), 1_614_834_367);
    }

    #[test]
    fn test_numeric_id_and_coarse_date() {
        let mut p = post("1", PUBLISHED);
        p["id"] = json!(12345);
        p["created"] = json!("2021-03-04T05:06:07Z");
        let doc = parse_blog_post(&p).unwrap();
        assert_eq!(doc.id, "12345");
        assert_eq!(doc.date.timestamp(), 1_614_834_367);
    }

    #[test]
    fn test_invalid_posts_are_skip_reasons() {
        let mut no_url = post("1", PUBLISHED);
        no_url.as_object_mut().unwrap().remove("url");
        assert!(matches!(
            parse_blog_post(&no_url),
            Err(SkipReason::InvalidRecord { label, .. }) if label == "1"
        ));

        let mut bad_date = post("2", PUBLISHED);
        bad_date["created"] = json!("last tuesday");
        assert!(parse_blog_post(&bad_date).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2021-03-04T05:06:07+02:00").is_some());
        assert!(parse_date("2021-03-04T05:06:07.1Z").is_some());
        assert!(parse_date("2021-03-04").is_none());
    }

    #[tokio::test]
    async fn test_fetch_follows_paging_and_skips_drafts() {
        let server = MockServer::start().await;
        let second = format!("{}/cms/v3/blogs/posts?after=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/cms/v3/blogs/posts"))
            .and(query_param("after", "2"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [post("3", PUBLISHED)]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cms/v3/blogs/posts"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [post("1", PUBLISHED), post("2", "DRAFT")],
                "paging": { "next": { "link": second } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = BlogSource::new(
            "blog",
            &server.uri(),
            "token",
            reqwest::Client::new(),
            RetryPolicy::default(),
        );
        let fetched = source.fetch().await.unwrap();
        let ids: Vec<String> = fetched
            .documents
            .into_iter()
            .map(|d| d.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(fetched.version_token.len(), "2024-01-01-00-00-00-000000".len());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let source = BlogSource::new(
            "blog",
            &server.uri(),
            "bad",
            reqwest::Client::new(),
            RetryPolicy::default(),
        );
        assert!(source.fetch().await.is_err());
    }
}
