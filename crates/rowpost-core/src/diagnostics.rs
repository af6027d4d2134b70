// crates/rowpost-core/src/diagnostics.rs
// ============================================================================
// Module: Failure Diagnostics
// Description: Structured server error fields carried by failure envelopes.
// Purpose: Expose deeper failure detail without leaking driver types.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! When the server reports an error it attaches a set of diagnostic fields
//! beyond the SQLSTATE and primary message. [`Diagnostics`] carries those
//! fields in a driver-independent record so callers can introspect failures
//! (for example, which constraint a `23505` violated) without depending on
//! the Postgres driver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

/// Structured detail for a server-reported failure.
///
/// # Invariants
/// - Constructed once by the normalizer; never mutated afterwards.
/// - Field names follow the server's error-field vocabulary, so absent
///   fields mean the server did not report them, not that they were lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Severity label reported by the server (for example `ERROR`, `FATAL`).
    pub severity: String,
    /// Primary human-readable error message.
    pub message_primary: String,
    /// Secondary message with additional detail, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_detail: Option<String>,
    /// Suggestion on how to resolve the problem, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_hint: Option<String>,
    /// Call stack or statement context for the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Schema name associated with the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// Table name associated with the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Column name associated with the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// Data type name associated with the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype_name: Option<String>,
    /// Constraint name associated with the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
    /// Server source file that reported the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Server source line that reported the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
    /// Server routine that reported the error, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_function: Option<String>,
}
