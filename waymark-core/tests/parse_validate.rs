use waymark_core::{parse_playbook_str, validate_playbook, DocumentFormat};

fn minimal_valid_yaml() -> &'static str {
    r#"
sessions:
  api:
    base_url: https://api.example.com
phases:
  - name: ingest
    steps:
      - name: fetch-users
        session: api
        request:
          method: get
          endpoint: /users
        store:
          users: body
"#
}

#[test]
fn parse_yaml_and_validate_ok() {
    let playbook = parse_playbook_str(minimal_valid_yaml(), DocumentFormat::Yaml).unwrap();
    validate_playbook(&playbook).unwrap();
}

#[test]
fn parse_auto_detects_yaml() {
    let playbook = parse_playbook_str(minimal_valid_yaml(), DocumentFormat::Auto).unwrap();
    assert_eq!(playbook.phases.len(), 1);
    assert_eq!(playbook.phases[0].steps[0].name, "fetch-users");
}

#[test]
fn parse_json_and_validate_ok() {
    let json = r#"
{
  "sessions": {
    "api": { "base_url": "https://api.example.com" }
  },
  "phases": [
    {
      "name": "ingest",
      "steps": [
        { "name": "fetch-users", "session": "api",
          "request": { "method": "GET", "endpoint": "/users" } }
      ]
    }
  ]
}
"#;
    let playbook = parse_playbook_str(json, DocumentFormat::Auto).unwrap();
    validate_playbook(&playbook).unwrap();
    assert_eq!(
        playbook.phases[0].steps[0].request.method.as_str(),
        "GET"
    );
}

#[test]
fn unknown_fields_are_rejected_at_parse() {
    let bad = minimal_valid_yaml().replace("store:", "stor:");
    let err = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap_err();
    assert!(format!("{err}").contains("stor"));
}

#[test]
fn playbook_without_phases_fails_validation() {
    let playbook = parse_playbook_str(
        "sessions:\n  api:\n    base_url: https://api.example.com\n",
        DocumentFormat::Yaml,
    )
    .unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "phases" && v.message.contains("at least one")));
}

#[test]
fn undeclared_session_is_rejected() {
    let bad = minimal_valid_yaml().replace("session: api", "session: nope");
    let playbook = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "phases[0].steps[0].session" && v.message.contains("nope")));
}

#[test]
fn non_http_base_url_is_rejected() {
    let bad = minimal_valid_yaml().replace(
        "base_url: https://api.example.com",
        "base_url: ftp://api.example.com",
    );
    let playbook = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "sessions.api.base_url" && v.message.contains("ftp")));
}

#[test]
fn duplicate_step_names_are_rejected() {
    let bad = r#"
sessions:
  api:
    base_url: https://api.example.com
phases:
  - name: ingest
    steps:
      - name: fetch
        session: api
        request: { method: get, endpoint: /a }
      - name: fetch
        session: api
        request: { method: get, endpoint: /b }
"#;
    let playbook = parse_playbook_str(bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.message.contains("must be unique within the phase")));
}

#[test]
fn malformed_iterate_clause_is_rejected() {
    let bad = minimal_valid_yaml().replace(
        "session: api",
        "session: api\n        iterate: \"id over ids\"",
    );
    let playbook = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "phases[0].steps[0].iterate"));
}

#[test]
fn bad_store_extraction_path_is_rejected() {
    let bad = minimal_valid_yaml().replace("users: body", "users: payload.users");
    let playbook = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "phases[0].steps[0].store.users"));
}

#[test]
fn breaker_jitter_out_of_range_is_rejected() {
    let bad = minimal_valid_yaml().replace(
        "base_url: https://api.example.com",
        "base_url: https://api.example.com\n    circuit_breaker: { jitter: 1.5 }",
    );
    let playbook = parse_playbook_str(&bad, DocumentFormat::Yaml).unwrap();
    let err = validate_playbook(&playbook).unwrap_err();
    assert!(err
        .violations
        .iter()
        .any(|v| v.path == "sessions.api.circuit_breaker.jitter"));
}

#[test]
fn retry_spec_defaults_apply() {
    let yaml = minimal_valid_yaml().replace(
        "session: api",
        "session: api\n        retry: { max_retries: 3 }",
    );
    let playbook = parse_playbook_str(&yaml, DocumentFormat::Yaml).unwrap();
    let retry = playbook.phases[0].steps[0].retry.clone().unwrap();
    assert_eq!(retry.max_retries, 3);
    assert_eq!(retry.retry_statuses, vec![500, 502, 503, 504]);
    assert_eq!(retry.max_delay_seconds, 60.0);
}

#[test]
fn content_hash_is_stable_and_sensitive() {
    let a = parse_playbook_str(minimal_valid_yaml(), DocumentFormat::Yaml).unwrap();
    let b = parse_playbook_str(minimal_valid_yaml(), DocumentFormat::Yaml).unwrap();
    assert_eq!(a.content_hash(), b.content_hash());

    let edited = minimal_valid_yaml().replace("endpoint: /users", "endpoint: /accounts");
    let c = parse_playbook_str(&edited, DocumentFormat::Yaml).unwrap();
    assert_ne!(a.content_hash(), c.content_hash());
}
