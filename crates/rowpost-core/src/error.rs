// crates/rowpost-core/src/error.rs
// ============================================================================
// Module: Usage Errors
// Description: Programmer-usage errors surfaced by the client API.
// Purpose: Keep misuse distinct from database failures carried in envelopes.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Database failures never escape the access layer as errors; they are
//! folded into [`DbResponse`](crate::DbResponse) envelopes. The one class of
//! failure that does surface as an `Err` is programmer misuse of the API
//! itself: committing with no preserved transaction, or reading an envelope
//! field whose precondition does not hold. [`UsageError`] enumerates those
//! cases.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Usage Error
// ============================================================================

/// Programmer-usage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Never produced by database or network failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// `commit` was called with no preserved transaction on the client.
    #[error("no preserved transaction: call execute_preserved first")]
    NoPreservedTransaction,
    /// An accessor that requires a successful envelope was called on a
    /// failure envelope.
    #[error("{accessor} is only valid on a successful envelope (code {code})")]
    CalledOnError {
        /// Name of the accessor that was misused.
        accessor: &'static str,
        /// Code of the failure envelope the accessor was called on.
        code: String,
    },
    /// `total_count` was read from an envelope that was not produced by the
    /// paginated operation.
    #[error("total count is only set by the paginated operation")]
    TotalCountUnset,
    /// `notices` was read from an envelope produced while notice capture was
    /// disabled on the client.
    #[error("notices were not captured: enable them with set_notices(true)")]
    NoticesDisabled,
}
