//! Integration test for a single-page result with no continuation.

mod common;

use serde_json::json;
use statement_core::SessionProperties;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scenario S1: a single-page result with no continuation URI.
#[tokio::test]
async fn basic_select_returns_one_row_and_finishes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "20260101_000000_00001_abcde",
            "infoUri": format!("{}/v1/query/abc", server.uri()),
            "stats": {"state": "FINISHED"},
            "columns": [{"name": "_col0", "type": "bigint"}],
            "data": [[1]]
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let (statement, stream) = client
        .execute("select 1", &[], SessionProperties::default())
        .await
        .expect("submit succeeds");

    assert!(stream.next().await.expect("first page arrives"));
    let page = stream.current().await.expect("page was recorded");
    assert_eq!(page.columns.as_ref().unwrap()[0].name, "_col0");
    assert_eq!(page.data.as_ref().unwrap(), &vec![vec![json!(1)]]);
    assert!(page.next_uri.is_none());

    assert!(!stream.next().await.expect("no further pages"));
    assert!(stream.is_finished().await);
    assert_eq!(statement.state(), statement_core::QueryState::Finished);
}
