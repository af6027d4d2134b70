// crates/rowpost-client/src/pool/tests.rs
// ============================================================================
// Module: Pool Unit Tests
// Description: Unit tests for failure classification and shared slots.
// Purpose: Validate pool error handling without a live database.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use super::AcquireError;
use super::PgPool;
use super::SharedSlots;
use super::classify_acquire;
use super::classify_construction;
use crate::config::PoolConfig;

/// Builds slots with an optional recorded connect failure.
fn slots_with(connect_error: Option<&str>) -> SharedSlots {
    let slots = SharedSlots::default();
    if let (Some(message), Ok(mut slot)) = (connect_error, slots.last_connect_error.lock()) {
        *slot = Some(message.to_string());
    }
    slots
}

#[test]
fn acquire_timeout_without_connect_error_is_exhaustion() {
    let slots = slots_with(None);
    let error = classify_acquire("timed out waiting for connection".to_string(), &slots);
    assert_eq!(error, AcquireError::Exhausted("timed out waiting for connection".to_string()));
}

#[test]
fn acquire_timeout_after_connect_error_is_unreachable() {
    let slots = slots_with(Some("connection refused"));
    let error = classify_acquire("timed out waiting for connection".to_string(), &slots);
    assert_eq!(error, AcquireError::Unreachable("connection refused".to_string()));
}

#[test]
fn connect_error_slot_is_consumed_by_classification() {
    let slots = slots_with(Some("connection refused"));
    let first = classify_acquire("timeout".to_string(), &slots);
    let second = classify_acquire("timeout".to_string(), &slots);
    assert!(matches!(first, AcquireError::Unreachable(_)));
    assert!(matches!(second, AcquireError::Exhausted(_)));
}

#[test]
fn construction_failure_without_connect_error_is_uncategorized() {
    let slots = slots_with(None);
    let error = classify_construction("worker panicked".to_string(), &slots);
    assert!(matches!(error, AcquireError::Other(_)));
}

#[test]
fn invalid_connection_string_is_remembered() {
    let config = PoolConfig {
        connection: "not a connection string".to_string(),
        ..PoolConfig::default()
    };
    let pool = PgPool::connect(&config);
    assert!(matches!(pool.construction_error(), Some(AcquireError::Other(_))));
    let first = pool.acquire().err().expect("remembered failure");
    let second = pool.acquire().err().expect("remembered failure");
    assert_eq!(first, second);
    assert_eq!(pool.state().connections, 0);
}

#[test]
fn notice_buffer_clears_and_drains() {
    let config = PoolConfig {
        connection: "not a connection string".to_string(),
        ..PoolConfig::default()
    };
    let pool = PgPool::connect(&config);
    if let Ok(mut buffer) = pool.slots.notices.lock() {
        buffer.push("stale".to_string());
    }
    pool.clear_notices();
    assert!(pool.take_notices().is_empty());
    if let Ok(mut buffer) = pool.slots.notices.lock() {
        buffer.push("fresh".to_string());
    }
    assert_eq!(pool.take_notices(), ["fresh".to_string()]);
    assert!(pool.take_notices().is_empty());
}
