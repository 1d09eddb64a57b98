//! Integration test for cancellation before any row is consumed.

mod common;

use serde_json::json;
use statement_core::SessionProperties;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scenario S4: cancelling before any row is consumed still leaves the
/// schema captured on page one retrievable through `WaitForColumns`.
#[tokio::test]
async fn cancellation_preserves_columns_captured_on_first_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "20260101_000000_00005_abcde",
            "nextUri": format!("{}/v1/statement/executing/page2", server.uri()),
            "infoUri": format!("{}/v1/query/abc", server.uri()),
            "stats": {"state": "RUNNING"},
            "columns": [{"name": "_col0", "type": "bigint"}],
        })))
        .mount(&server)
        .await;

    // Cancel() issues a DELETE on the continuation URI, but the fetcher
    // never GETs page two: cancellation transitions the client out of
    // Running before the background loop's next read-ahead check.
    Mock::given(method("DELETE"))
        .and(path("/v1/statement/executing/page2"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let (statement, stream) = client
        .execute("select * from huge_table", &[], SessionProperties::default())
        .await
        .expect("submit succeeds");

    assert!(statement.cancel().await);

    let columns = stream
        .wait_for_columns()
        .await
        .expect("wait_for_columns does not error after cancellation")
        .expect("columns captured on page one are still available");
    assert_eq!(columns[0].name, "_col0");

    let requests = server.received_requests().await.expect("wiremock records requests");
    assert!(requests.iter().any(|r| r.method.as_str() == "DELETE"));
    assert!(!requests.iter().any(|r| r.method.as_str() == "GET"));
}
