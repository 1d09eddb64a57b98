//! Integration test for NaN progress percentage decoding.

mod common;

use serde_json::json;
use statement_core::SessionProperties;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scenario S6: `progressPercentage` arrives as the literal string `"NaN"`
/// before statistics become available.
#[tokio::test]
async fn nan_progress_percentage_decodes_without_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "20260101_000000_00007_abcde",
            "infoUri": format!("{}/v1/query/abc", server.uri()),
            "stats": {"state": "QUEUED", "progressPercentage": "NaN"},
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let (statement, _stream) = client
        .execute("select 1", &[], SessionProperties::default())
        .await
        .expect("submit succeeds");

    let page = statement.last_page().await.expect("page was recorded");
    assert!(page.stats.progress_percentage.expect("present").is_nan());
}
