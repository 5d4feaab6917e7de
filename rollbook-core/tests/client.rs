use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use rollbook_core::{ApiErrorClass, BranchOutcome, ContentsClient, ContentsError};

fn make_client(server: &MockServer) -> ContentsClient {
    ContentsClient::with_base_url(&server.uri(), "test-token", "school", "records", "data").unwrap()
}

fn encoded(value: &serde_json::Value) -> String {
    BASE64.encode(value.to_string().as_bytes())
}

#[tokio::test]
async fn get_file_decodes_content_and_returns_sha() {
    let server = MockServer::start().await;
    let document = json!({ "students": [{ "name": "Jöhn Müller" }] });

    Mock::given(method("GET"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .and(query_param("ref", "data"))
        .and(header("authorization", "token test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": encoded(&document),
            "sha": "abc123"
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let file = client
        .get_file("rollbook-data.json")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(file.sha, "abc123");
    assert_eq!(file.content["students"][0]["name"], "Jöhn Müller");
}

#[tokio::test]
async fn get_file_returns_none_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = make_client(&server);
    assert!(client.get_file("rollbook-data.json").await.unwrap().is_none());
}

#[tokio::test]
async fn get_file_surfaces_garbage_content_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "!!!not-base64!!!",
            "sha": "abc123"
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client.get_file("rollbook-data.json").await.unwrap_err();
    assert!(matches!(err, ContentsError::Base64(_)));
}

#[tokio::test]
async fn put_file_attaches_sha_for_updates() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .and(header("authorization", "token test-token"))
        .and(body_partial_json(json!({
            "branch": "data",
            "sha": "old-sha"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": { "sha": "new-sha" }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let result = client
        .put_file("rollbook-data.json", &json!({ "students": [] }), Some("old-sha"))
        .await
        .unwrap();

    assert_eq!(result.content.unwrap().sha, "new-sha");
}

#[tokio::test]
async fn put_file_omits_sha_when_creating() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            if body.get("sha").is_some() {
                ResponseTemplate::new(422)
            } else {
                ResponseTemplate::new(201).set_body_json(json!({
                    "content": { "sha": "first-sha" }
                }))
            }
        })
        .mount(&server)
        .await;

    let client = make_client(&server);
    let result = client
        .put_file("rollbook-data.json", &json!({ "students": [] }), None)
        .await
        .unwrap();

    assert_eq!(result.content.unwrap().sha, "first-sha");
}

#[tokio::test]
async fn put_file_content_survives_non_ascii_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let raw = BASE64
                .decode(body["content"].as_str().unwrap().as_bytes())
                .unwrap();
            let decoded: serde_json::Value =
                serde_json::from_str(&String::from_utf8(raw).unwrap()).unwrap();
            assert_eq!(decoded["name"], "Jöhn Müller");
            ResponseTemplate::new(201).set_body_json(json!({ "content": { "sha": "s" } }))
        })
        .mount(&server)
        .await;

    let client = make_client(&server);
    client
        .put_file("rollbook-data.json", &json!({ "name": "Jöhn Müller" }), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn put_file_propagates_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/school/records/contents/rollbook-data.json"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "rollbook-data.json does not match"
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client
        .put_file("rollbook-data.json", &json!({}), Some("stale"))
        .await
        .unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Conflict));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn ensure_branch_exists_is_a_noop_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/branches/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "data" })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    assert_eq!(
        client.ensure_branch_exists().await.unwrap(),
        BranchOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn ensure_branch_exists_creates_from_default_head() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/branches/data"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": { "sha": "head-sha" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/school/records/git/refs"))
        .and(body_partial_json(json!({
            "ref": "refs/heads/data",
            "sha": "head-sha"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "ref": "refs/heads/data"
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    assert_eq!(
        client.ensure_branch_exists().await.unwrap(),
        BranchOutcome::Created
    );
}

#[tokio::test]
async fn ensure_branch_exists_propagates_missing_default_head() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/branches/data"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": {} })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client.ensure_branch_exists().await.unwrap_err();
    assert!(matches!(err, ContentsError::MissingHeadSha));
}

#[tokio::test]
async fn ensure_branch_exists_propagates_creation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/branches/data"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/school/records/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": { "sha": "head-sha" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/school/records/git/refs"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Resource not accessible"
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client.ensure_branch_exists().await.unwrap_err();
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
}

#[tokio::test]
async fn test_connection_returns_account_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "token test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "registrar" })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let account = client.test_connection().await.unwrap();
    assert_eq!(account.login, "registrar");
}

#[tokio::test]
async fn test_connection_rejects_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
}
