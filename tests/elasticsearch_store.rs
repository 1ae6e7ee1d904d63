use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docs_indexer::http::RetryPolicy;
use docs_indexer::schema::IndexSchema;
use docs_indexer::store::elasticsearch::ElasticsearchStore;
use docs_indexer::store::DocumentStore;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_rate_limit_wait: Duration::from_millis(5),
    }
}

fn store(server: &MockServer, api_key: Option<&str>) -> ElasticsearchStore {
    ElasticsearchStore::new(
        reqwest::Client::new(),
        &server.uri(),
        api_key.map(str::to_string),
        fast_policy(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_index_exists_maps_head_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/docs-abc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/docs-new"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let s = store(&server, None);
    assert!(s.index_exists("docs-abc").await.unwrap());
    assert!(!s.index_exists("docs-new").await.unwrap());
}

#[tokio::test]
async fn test_create_index_sends_schema_and_api_key() {
    let server = MockServer::start().await;
    let schema = IndexSchema::blog();
    Mock::given(method("PUT"))
        .and(path("/blog-2024-01-01-00-00-00"))
        .and(header("authorization", "ApiKey secret"))
        .and(body_json(schema.to_body()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, Some("secret"))
        .create_index("blog-2024-01-01-00-00-00", &schema)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/docs-v1/_doc/.+$"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/docs-v1/_doc/.+$"))
        .and(body_json(json!({ "title": "A" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, None)
        .upsert("docs-v1", "/guide/a/", &json!({ "title": "A" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": { "type": "mapper_parsing_exception" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = store(&server, None)
        .upsert("docs-v1", "a", &json!({ "date": "yesterday" }))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("400"));
}

#[tokio::test]
async fn test_get_alias_lists_bound_indices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_alias/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs-b": { "aliases": { "docs": {} } },
            "docs-a": { "aliases": { "docs": {} } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_alias/blog"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "alias [blog] missing", "status": 404
        })))
        .mount(&server)
        .await;

    let s = store(&server, None);
    assert_eq!(s.get_alias("docs").await.unwrap(), vec!["docs-a", "docs-b"]);
    assert!(s.get_alias("blog").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_alias_and_index_lifecycle_requests() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/docs-new/_alias/docs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/docs-old/_alias/docs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/docs-old"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let s = store(&server, None);
    s.put_alias("docs-new", "docs").await.unwrap();
    s.delete_alias("docs-old", "docs").await.unwrap();
    s.delete_index("docs-old").await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_index_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/docs-gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert!(store(&server, None).delete_index("docs-gone").await.is_err());
}
