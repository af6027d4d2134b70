// crates/rowpost-client/src/normalize.rs
// ============================================================================
// Module: Error Normalization
// Description: Maps every operation failure onto the uniform code taxonomy.
// Purpose: Guarantee callers can branch on stable codes for any failure.
// Dependencies: postgres, rowpost-core
// ============================================================================

//! ## Overview
//! Every failure an operation can hit is collected into [`OpError`] and
//! normalized into a `(code, message, diagnostics)` triple. Server-reported
//! errors pass their SQLSTATE, message, and diagnostic fields through
//! unchanged; client-side driver failures synthesize an empty code with a
//! `kind: text` message; acquisition failures carry the connection-exception
//! code their [`AcquireError`] classification selected; binding problems map
//! to the warning code with a hint. No failure, whatever its origin, leaves
//! this module without a code the caller can branch on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::error::DbError;

use rowpost_core::Diagnostics;
use rowpost_core::codes;

use crate::pool::AcquireError;

// ============================================================================
// SECTION: Operation Errors
// ============================================================================

/// Internal failure union for one database operation.
#[derive(Debug)]
pub(crate) enum OpError {
    /// The driver reported an error, server-side or client-side.
    Driver(postgres::Error),
    /// A connection could not be acquired from the pool.
    Acquire(AcquireError),
    /// The statement's placeholders do not match the supplied parameters.
    BindingMismatch {
        /// Placeholder names with no matching parameter key.
        missing: Vec<String>,
        /// Parameter keys the caller supplied.
        supplied: Vec<String>,
    },
    /// A bulk statement did not carry exactly one `:rows` placeholder.
    BulkMarker {
        /// Placeholder names actually found in the statement.
        placeholders: Vec<String>,
    },
    /// A bulk row's width disagrees with the first row.
    BulkShape {
        /// Index of the offending row.
        row_index: usize,
        /// Width established by the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// The paginated operation was called without an `offset` parameter.
    MissingOffset,
    /// An internal inconsistency, such as a count query with no rows.
    Internal(String),
}

/// A normalized failure: stable code, message, optional diagnostics.
#[derive(Debug)]
pub(crate) struct Normalized {
    /// SQLSTATE classification, or empty for synthesized failures.
    pub(crate) code: String,
    /// Human-readable failure detail.
    pub(crate) message: String,
    /// Structured server diagnostics, for server-reported failures.
    pub(crate) diagnostics: Option<Diagnostics>,
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes any operation failure into the uniform triple.
pub(crate) fn normalize(error: &OpError) -> Normalized {
    match error {
        OpError::Driver(err) => err.as_db_error().map_or_else(
            || Normalized {
                code: String::new(),
                message: format!("postgres::Error: {err}"),
                diagnostics: None,
            },
            |db| Normalized {
                code: db.code().code().to_string(),
                message: db.message().to_string(),
                diagnostics: Some(diagnostics_from(db)),
            },
        ),
        OpError::Acquire(err) => Normalized {
            code: acquire_code(err).to_string(),
            message: err.to_string(),
            diagnostics: None,
        },
        OpError::BindingMismatch { missing, supplied } => Normalized {
            code: codes::WARNING.to_string(),
            message: format!(
                "binding mismatch: placeholders [{}] have no matching parameter key; supplied \
                 keys: [{}]; placeholders use :name syntax",
                missing.join(", "),
                supplied.join(", ")
            ),
            diagnostics: None,
        },
        OpError::BulkMarker { placeholders } => Normalized {
            code: codes::WARNING.to_string(),
            message: format!(
                "bulk statements bind their rows through a single :rows placeholder, for \
                 example INSERT INTO t (a, b) VALUES :rows; found placeholders: [{}]",
                placeholders.join(", ")
            ),
            diagnostics: None,
        },
        OpError::BulkShape {
            row_index,
            expected,
            found,
        } => Normalized {
            code: codes::WARNING.to_string(),
            message: format!(
                "bulk row {row_index} has {found} values but the first row established a width \
                 of {expected}"
            ),
            diagnostics: None,
        },
        OpError::MissingOffset => Normalized {
            code: codes::INVALID_PARAMETER.to_string(),
            message: "paginated statements require an 'offset' parameter key".to_string(),
            diagnostics: None,
        },
        OpError::Internal(message) => Normalized {
            code: codes::SYSTEM_ERROR.to_string(),
            message: message.clone(),
            diagnostics: None,
        },
    }
}

/// Maps an acquisition failure onto its connection-exception code.
const fn acquire_code(error: &AcquireError) -> &'static str {
    match error {
        AcquireError::Unreachable(_) => codes::UNABLE_TO_CONNECT,
        AcquireError::Exhausted(_) => codes::CONNECTION_DOES_NOT_EXIST,
        AcquireError::Other(_) => codes::CONNECTION_EXCEPTION,
    }
}

/// Builds the driver-independent diagnostics record from a server error.
fn diagnostics_from(db: &DbError) -> Diagnostics {
    Diagnostics {
        severity: db.severity().to_string(),
        message_primary: db.message().to_string(),
        message_detail: db.detail().map(ToString::to_string),
        message_hint: db.hint().map(ToString::to_string),
        context: db.where_().map(ToString::to_string),
        schema_name: db.schema().map(ToString::to_string),
        table_name: db.table().map(ToString::to_string),
        column_name: db.column().map(ToString::to_string),
        datatype_name: db.datatype().map(ToString::to_string),
        constraint_name: db.constraint().map(ToString::to_string),
        source_file: db.file().map(ToString::to_string),
        source_line: db.line(),
        source_function: db.routine().map(ToString::to_string),
    }
}
