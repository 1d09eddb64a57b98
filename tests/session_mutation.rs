//! Integration test for session property and catalog/schema mutation.

mod common;

use serde_json::json;
use statement_core::SessionProperties;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scenario S7: `set session writer_min_size='64MB'` followed by `USE
/// tpch.sf10`. After both statements finish, the threaded-through session
/// carries the merged catalog, schema, and session property.
#[tokio::test]
async fn set_session_then_use_merges_into_session_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .and(body_string("set session writer_min_size='64MB'"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Trino-Set-Session", "writer_min_size=64MB")
                .set_body_json(json!({
                    "id": "20260101_000000_00003_abcde",
                    "infoUri": format!("{}/v1/query/abc", server.uri()),
                    "stats": {"state": "FINISHED"},
                })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .and(body_string("USE tpch.sf10"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Trino-Set-Catalog", "tpch")
                .insert_header("X-Trino-Set-Schema", "sf10")
                .set_body_json(json!({
                    "id": "20260101_000000_00004_abcde",
                    "infoUri": format!("{}/v1/query/abc", server.uri()),
                    "stats": {"state": "FINISHED"},
                })),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());

    let (set_session, _stream1) = client
        .execute("set session writer_min_size='64MB'", &[], SessionProperties::default())
        .await
        .expect("set session succeeds");
    let session_after_set = set_session.session().await;

    let (use_stmt, _stream2) = client
        .execute("USE tpch.sf10", &[], session_after_set)
        .await
        .expect("use succeeds");
    let final_session = use_stmt.session().await;

    assert_eq!(final_session.catalog.as_deref(), Some("tpch"));
    assert_eq!(final_session.schema.as_deref(), Some("sf10"));
    assert_eq!(
        final_session.session_properties.get("writer_min_size").map(String::as_str),
        Some("64MB")
    );
}
