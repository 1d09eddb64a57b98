//! Integration test for decoding every scalar and nested logical type.

mod common;

use serde_json::json;
use statement_core::{SessionProperties, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scenario S3: a wide result row exercising every scalar and nested logical
/// type in one page, decoded through the full submit/stream pipeline rather
/// than unit-tested in isolation.
#[tokio::test]
async fn all_types_row_decodes_through_the_full_pipeline() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "20260101_000000_00008_abcde",
            "infoUri": format!("{}/v1/query/abc", server.uri()),
            "stats": {"state": "FINISHED"},
            "columns": [
                {"name": "c_bigint", "type": "bigint"},
                {"name": "c_boolean", "type": "boolean"},
                {"name": "c_double", "type": "double"},
                {"name": "c_decimal", "type": "decimal(24,10)"},
                {"name": "c_varchar", "type": "varchar"},
                {"name": "c_char", "type": "char(10)"},
                {"name": "c_array", "type": "array(integer)"},
                {"name": "c_map", "type": "map(varchar,bigint)"},
                {"name": "c_row", "type": "row(a integer, b varchar)"},
            ],
            "data": [[
                9223372036854775807i64,
                true,
                3.5,
                "123456789000.1234005",
                "hello world",
                "0123456789abc",
                [1, 2, 3],
                {"x": 1},
                [7, "seven"],
            ]]
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let (_statement, stream) = client
        .execute("select * from all_types_fixture", &[], SessionProperties::default())
        .await
        .expect("submit succeeds");

    assert!(stream.next().await.expect("page arrives"));
    let page = stream.current().await.expect("page recorded");
    let columns = page.columns.as_ref().expect("columns present");
    let row = &page.data.as_ref().expect("data present")[0];

    for (i, column) in columns.iter().enumerate() {
        let logical_type = column.logical_type.as_ref().expect("resolved on ingest");
        let value = statement_core::types::decode_value(&row[i], logical_type)
            .unwrap_or_else(|e| panic!("decoding {} failed: {e}", column.name));

        match column.name.as_str() {
            "c_bigint" => assert_eq!(value, Value::BigInt(i64::MAX)),
            "c_boolean" => assert_eq!(value, Value::Boolean(true)),
            "c_double" => assert_eq!(value, Value::Double(3.5)),
            "c_decimal" => match value {
                Value::Decimal(d) => assert_eq!(d.to_canonical_string(), "123456789000.1234005"),
                other => panic!("expected decimal, got {other:?}"),
            },
            "c_varchar" => assert_eq!(value, Value::Varchar("hello world".to_string())),
            "c_char" => assert_eq!(value, Value::Char("0123456789".to_string())),
            "c_array" => assert_eq!(
                value,
                Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
            ),
            "c_map" => match value {
                Value::Map(entries) => {
                    assert_eq!(entries, vec![(Value::Varchar("x".to_string()), Value::BigInt(1))])
                }
                other => panic!("expected map, got {other:?}"),
            },
            "c_row" => match value {
                Value::Row(fields) => {
                    assert_eq!(fields, vec![Value::Integer(7), Value::Varchar("seven".to_string())])
                }
                other => panic!("expected row, got {other:?}"),
            },
            other => panic!("unexpected column: {other}"),
        }
    }

    assert!(!stream.next().await.expect("no further pages"));
}
