#![allow(clippy::unwrap_used, clippy::expect_used)]

use grove_core::errors::{ExError, ExErrorKind};
use grove_core::logging_facility::test_capture::{init_test_capture, CapturedEvent, TestCapture};
use grove_core::{log_op_end, log_op_error, log_op_start};
use grove_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_COMMITTED, FIELD_COMPONENT, FIELD_CONTEXT_ID,
    FIELD_DURATION_MS, FIELD_ERROR, FIELD_ERR_CODE, FIELD_ERR_KIND, FIELD_MODEL,
};
use std::time::{Duration, Instant};

fn only_event(capture: &TestCapture, op: &str, event: &str) -> CapturedEvent {
    let mut found: Vec<CapturedEvent> = capture
        .events_for(op)
        .into_iter()
        .filter(|e| e.is(op, event))
        .collect();
    assert_eq!(found.len(), 1, "expected one {} event for {}", event, op);
    found.remove(0)
}

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "grove_test_log_op_start_1";

    log_op_start!(op_name);

    let start = only_event(&capture, op_name, EVENT_START);
    assert!(start
        .field(FIELD_COMPONENT)
        .unwrap()
        .ends_with("logging_facility_tests"));
    assert_eq!(start.field(FIELD_DURATION_MS), None);
}

#[test]
fn test_log_op_end_measures_from_since() {
    let capture = init_test_capture();
    let op_name = "grove_test_log_op_end_2";

    let started = Instant::now() - Duration::from_millis(40);
    log_op_end!(op_name, since = started);

    let end = only_event(&capture, op_name, EVENT_END);
    let duration: u64 = end.field(FIELD_DURATION_MS).unwrap().parse().unwrap();
    assert!(duration >= 40);
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "grove_test_log_op_error_3";

    let err = ExError::new(ExErrorKind::MergeConflict).with_message("clash");
    log_op_error!(op_name, err, since = Instant::now());

    capture.assert_error_code(op_name, "ERR_MERGE_CONFLICT");
    let failed = only_event(&capture, op_name, EVENT_END_ERROR);
    assert_eq!(failed.level, tracing::Level::ERROR);
    assert_eq!(failed.field(FIELD_ERR_KIND), Some("MergeConflict"));
    assert!(failed.field(FIELD_ERROR).unwrap().contains("clash"));
    assert!(failed.field(FIELD_DURATION_MS).is_some());
}

#[test]
fn test_domain_errors_convert_in_macro() {
    let capture = init_test_capture();
    let op_name = "grove_test_log_op_error_domain_4";

    let err = grove_core::Predicate::parse("name ==").unwrap_err();
    log_op_error!(op_name, err, since = Instant::now());

    capture.assert_error_code(op_name, "ERR_INVALID_PREDICATE");
}

#[test]
fn test_extra_fields_are_captured() {
    let capture = init_test_capture();
    let op_name = "grove_test_extra_fields_5";
    let started = Instant::now();

    log_op_start!(op_name, model = "Catalog");
    log_op_end!(op_name, since = started, context_id = "c-1", committed = 2u64);
    log_op_error!(
        op_name,
        ExError::new(ExErrorKind::Validation),
        since = started,
        model = "Catalog"
    );

    let start = only_event(&capture, op_name, EVENT_START);
    assert_eq!(start.field(FIELD_MODEL), Some("Catalog"));

    let end = only_event(&capture, op_name, EVENT_END);
    assert_eq!(end.field(FIELD_CONTEXT_ID), Some("c-1"));
    assert_eq!(end.field(FIELD_COMMITTED), Some("2"));
    assert_eq!(end.field(FIELD_MODEL), None);

    let failed = only_event(&capture, op_name, EVENT_END_ERROR);
    assert_eq!(failed.field(FIELD_MODEL), Some("Catalog"));
    assert_eq!(failed.field(FIELD_ERR_CODE), Some("ERR_VALIDATION"));
}
