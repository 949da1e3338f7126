use std::collections::BTreeMap;

use serde_json::json;
use waymark_core::{ExtractParseError, ExtractPath, ExtractionError};

fn headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("X-Request-Id".to_string(), "abc-123".to_string()),
    ])
}

#[test]
fn status_extracts_as_number() {
    let path = ExtractPath::parse("status").unwrap();
    let value = path.extract(201, &headers(), &json!(null)).unwrap();
    assert_eq!(value, json!(201));
}

#[test]
fn header_lookup_is_case_insensitive() {
    let path = ExtractPath::parse("headers.x-request-id").unwrap();
    let value = path.extract(200, &headers(), &json!(null)).unwrap();
    assert_eq!(value, json!("abc-123"));
}

#[test]
fn missing_header_is_an_error() {
    let path = ExtractPath::parse("headers.x-nope").unwrap();
    let err = path.extract(200, &headers(), &json!(null)).unwrap_err();
    assert!(matches!(err, ExtractionError::MissingHeader { name } if name == "x-nope"));
}

#[test]
fn whole_body_clones_the_value() {
    let body = json!({"a": 1});
    let path = ExtractPath::parse("body").unwrap();
    assert_eq!(path.extract(200, &BTreeMap::new(), &body).unwrap(), body);
}

#[test]
fn body_path_with_single_match() {
    let body = json!({"profile": {"name": "ada", "id": 7}});
    let path = ExtractPath::parse("body.profile.name").unwrap();
    assert_eq!(path.extract(200, &BTreeMap::new(), &body).unwrap(), json!("ada"));
}

#[test]
fn body_path_with_index() {
    let body = json!({"items": [{"id": 1}, {"id": 2}]});
    let path = ExtractPath::parse("body.items[1].id").unwrap();
    assert_eq!(path.extract(200, &BTreeMap::new(), &body).unwrap(), json!(2));
}

#[test]
fn body_path_on_array_root() {
    let body = json!([{"id": 10}]);
    let path = ExtractPath::parse("body[0].id").unwrap();
    assert_eq!(path.extract(200, &BTreeMap::new(), &body).unwrap(), json!(10));
}

#[test]
fn wildcard_match_yields_list() {
    let body = json!({"items": [{"id": 1}, {"id": 2}]});
    let path = ExtractPath::parse("body.items[*].id").unwrap();
    assert_eq!(path.extract(200, &BTreeMap::new(), &body).unwrap(), json!([1, 2]));
}

#[test]
fn zero_matches_is_an_error() {
    let body = json!({"profile": {}});
    let path = ExtractPath::parse("body.profile.name").unwrap();
    let err = path.extract(200, &BTreeMap::new(), &body).unwrap_err();
    assert!(matches!(err, ExtractionError::NoMatch { path } if path == "body.profile.name"));
}

#[test]
fn unknown_root_is_rejected_at_parse() {
    let err = ExtractPath::parse("payload.users").unwrap_err();
    assert!(matches!(err, ExtractParseError::UnknownRoot(_)));
}

#[test]
fn bodyless_prefix_is_not_a_body_path() {
    // "bodyguard" must not parse as a body query.
    let err = ExtractPath::parse("bodyguard").unwrap_err();
    assert!(matches!(err, ExtractParseError::UnknownRoot(_)));
}

#[test]
fn invalid_jsonpath_suffix_is_rejected() {
    let err = ExtractPath::parse("body.items[").unwrap_err();
    assert!(matches!(err, ExtractParseError::BadJsonPath { .. }));
}
