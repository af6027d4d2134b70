// crates/rowpost-core/src/envelope/tests.rs
// ============================================================================
// Module: Envelope Unit Tests
// Description: Unit tests for envelope accessors and predicates.
// Purpose: Validate accessor preconditions and the code taxonomy mapping.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use serde_json::Value;
use serde_json::json;

use super::DbResponse;
use super::RowMap;
use crate::codes;
use crate::diagnostics::Diagnostics;
use crate::error::UsageError;

/// Builds a single-column row for accessor tests.
fn row(name: &str, value: Value) -> RowMap {
    let mut map = RowMap::new();
    map.insert(name.to_string(), value);
    map
}

#[test]
fn success_envelope_has_success_code_and_no_message() {
    let envelope = DbResponse::success(vec![row("id", json!(1))]);
    assert_eq!(envelope.code(), codes::SUCCESS);
    assert!(envelope.message().is_none());
    assert!(envelope.is_success());
    assert!(!envelope.is_error());
}

#[test]
fn failure_envelope_carries_empty_rows() {
    let envelope = DbResponse::failure(codes::UNIQUE_VIOLATION, "duplicate key");
    assert!(envelope.is_error());
    assert!(envelope.rows().is_empty());
}

#[test]
fn is_empty_reflects_row_count_on_success() {
    let empty = DbResponse::success(Vec::new());
    let full = DbResponse::success(vec![row("id", json!(1))]);
    assert!(empty.is_empty().expect("success envelope"));
    assert!(!full.is_empty().expect("success envelope"));
}

#[test]
fn is_empty_rejects_failure_envelopes() {
    let envelope = DbResponse::failure(codes::UNABLE_TO_CONNECT, "connection refused");
    let result = envelope.is_empty();
    assert!(matches!(result, Err(UsageError::CalledOnError { accessor: "is_empty", .. })));
}

#[test]
fn first_row_returns_none_on_empty_success() {
    let envelope = DbResponse::success(Vec::new());
    assert!(envelope.first_row().expect("success envelope").is_none());
}

#[test]
fn first_row_returns_first_of_many() {
    let envelope = DbResponse::success(vec![row("id", json!(1)), row("id", json!(2))]);
    let first = envelope.first_row().expect("success envelope").expect("non-empty");
    assert_eq!(first.get("id"), Some(&json!(1)));
}

#[test]
fn first_row_rejects_failure_envelopes() {
    let envelope = DbResponse::failure(codes::RAISED_EXCEPTION, "boom");
    assert!(matches!(envelope.first_row(), Err(UsageError::CalledOnError { .. })));
}

#[test]
fn total_count_errors_when_unset() {
    let envelope = DbResponse::success(Vec::new());
    assert_eq!(envelope.total_count(), Err(UsageError::TotalCountUnset));
}

#[test]
fn total_count_round_trips_when_set() {
    let envelope = DbResponse::success(Vec::new()).with_total_count(25);
    assert_eq!(envelope.total_count(), Ok(25));
}

#[test]
fn notices_error_when_capture_disabled() {
    let envelope = DbResponse::success(Vec::new());
    assert_eq!(envelope.notices().err(), Some(UsageError::NoticesDisabled));
}

#[test]
fn notices_round_trip_when_captured() {
    let envelope =
        DbResponse::success(Vec::new()).with_notices(vec!["hello world".to_string()]);
    assert_eq!(envelope.notices().expect("captured"), ["hello world".to_string()]);
}

#[test]
fn named_predicates_match_their_codes() {
    assert!(DbResponse::failure(codes::UNABLE_TO_CONNECT, "x").connection_unreachable());
    assert!(DbResponse::failure(codes::UNIQUE_VIOLATION, "x").unique_violation());
    assert!(DbResponse::failure(codes::FOREIGN_KEY_VIOLATION, "x").foreign_key_violation());
    assert!(DbResponse::failure(codes::RAISED_EXCEPTION, "x").raised_exception());
    let success = DbResponse::success(Vec::new());
    assert!(!success.connection_unreachable());
    assert!(!success.unique_violation());
    assert!(!success.foreign_key_violation());
    assert!(!success.raised_exception());
}

#[test]
fn serializes_without_absent_optional_fields() {
    let envelope = DbResponse::success(vec![row("id", json!(1))]);
    let value = serde_json::to_value(&envelope).expect("serialize");
    let object = value.as_object().expect("object");
    assert_eq!(object.get("code"), Some(&json!(codes::SUCCESS)));
    assert!(object.contains_key("rows"));
    assert!(!object.contains_key("message"));
    assert!(!object.contains_key("diagnostics"));
    assert!(!object.contains_key("total_count"));
    assert!(!object.contains_key("notices"));
}

#[test]
fn serializes_diagnostics_on_failures() {
    let diagnostics = Diagnostics {
        severity: "ERROR".to_string(),
        message_primary: "duplicate key value violates unique constraint".to_string(),
        constraint_name: Some("users_email_key".to_string()),
        ..Diagnostics::default()
    };
    let envelope = DbResponse::failure(codes::UNIQUE_VIOLATION, "duplicate key")
        .with_diagnostics(diagnostics);
    let value = serde_json::to_value(&envelope).expect("serialize");
    assert_eq!(
        value
            .get("diagnostics")
            .and_then(|d| d.get("constraint_name")),
        Some(&json!("users_email_key"))
    );
}
