// crates/rowpost-core/src/envelope.rs
// ============================================================================
// Module: Result Envelope
// Description: Uniform success/failure result object for database operations.
// Purpose: Carry code, message, diagnostics, rows, and pagination totals.
// Dependencies: crate::codes, crate::diagnostics, crate::error, serde_json
// ============================================================================

//! ## Overview
//! Every database operation returns a [`DbResponse`]. A successful operation
//! carries code [`codes::SUCCESS`] and the fetched rows; a failed operation
//! carries the normalized SQLSTATE, a message, optional [`Diagnostics`], and
//! an empty row set. The envelope is constructed once with all fields
//! computed eagerly and is never mutated after it is returned; accessors
//! whose preconditions do not hold return [`UsageError`] instead of
//! panicking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::codes;
use crate::diagnostics::Diagnostics;
use crate::error::UsageError;

// ============================================================================
// SECTION: Row Type
// ============================================================================

/// A single result row: an ordered mapping of column name to value.
pub type RowMap = serde_json::Map<String, Value>;

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Uniform result envelope returned by every database operation.
///
/// # Invariants
/// - `rows` is always a concrete (possibly empty) sequence, never absent.
/// - Failure envelopes always carry an empty row set.
/// - Fields are fixed once the envelope is returned; there are no mutating
///   accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbResponse {
    /// SQLSTATE classification; [`codes::SUCCESS`] on success, another
    /// SQLSTATE on server failures, or empty for synthesized client-side
    /// failures.
    code: String,
    /// Human-readable failure detail; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Structured server diagnostics; present only for server-reported
    /// failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Diagnostics>,
    /// Fetched rows; empty on failures and on empty result sets.
    rows: Vec<RowMap>,
    /// Total matching rows ignoring the page window; set only by the
    /// paginated operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    total_count: Option<u64>,
    /// Server notices captured during the operation; set only when notice
    /// capture is enabled on the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    notices: Option<Vec<String>>,
}

impl DbResponse {
    /// Creates a success envelope carrying the fetched rows.
    #[must_use]
    pub fn success(rows: Vec<RowMap>) -> Self {
        Self {
            code: codes::SUCCESS.to_string(),
            message: None,
            diagnostics: None,
            rows,
            total_count: None,
            notices: None,
        }
    }

    /// Creates a failure envelope with a normalized code and message.
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            diagnostics: None,
            rows: Vec::new(),
            total_count: None,
            notices: None,
        }
    }

    /// Attaches server diagnostics to a failure envelope.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Sets the total matching row count (paginated operation only).
    #[must_use]
    pub const fn with_total_count(mut self, total: u64) -> Self {
        self.total_count = Some(total);
        self
    }

    /// Attaches captured server notices.
    #[must_use]
    pub fn with_notices(mut self, notices: Vec<String>) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Returns the SQLSTATE classification.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the server diagnostics, if any.
    #[must_use]
    pub const fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Returns the fetched rows.
    #[must_use]
    pub fn rows(&self) -> &[RowMap] {
        &self.rows
    }

    /// Returns `true` when the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }

    /// Returns `true` when the operation failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code != codes::SUCCESS
    }

    /// Returns `true` when the result set is empty.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::CalledOnError`] when the envelope is a failure;
    /// an empty row set on a failure says nothing about the query.
    pub fn is_empty(&self) -> Result<bool, UsageError> {
        self.require_success("is_empty")?;
        Ok(self.rows.is_empty())
    }

    /// Returns the first row of the result set, or `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::CalledOnError`] when the envelope is a failure.
    pub fn first_row(&self) -> Result<Option<&RowMap>, UsageError> {
        self.require_success("first_row")?;
        Ok(self.rows.first())
    }

    /// Returns the total matching row count from the paginated operation.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::TotalCountUnset`] when the envelope was not
    /// produced by the paginated operation.
    pub fn total_count(&self) -> Result<u64, UsageError> {
        self.total_count.ok_or(UsageError::TotalCountUnset)
    }

    /// Returns the server notices captured during the operation.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NoticesDisabled`] when notice capture was not
    /// enabled on the client.
    pub fn notices(&self) -> Result<&[String], UsageError> {
        self.notices.as_deref().ok_or(UsageError::NoticesDisabled)
    }

    /// Returns `true` when the failure was a connection-establishment
    /// problem: bad credentials, unreachable host, or a connect timeout.
    #[must_use]
    pub fn connection_unreachable(&self) -> bool {
        self.code == codes::UNABLE_TO_CONNECT
    }

    /// Returns `true` when the failure violated a unique constraint.
    #[must_use]
    pub fn unique_violation(&self) -> bool {
        self.code == codes::UNIQUE_VIOLATION
    }

    /// Returns `true` when the failure violated a foreign key constraint.
    #[must_use]
    pub fn foreign_key_violation(&self) -> bool {
        self.code == codes::FOREIGN_KEY_VIOLATION
    }

    /// Returns `true` when the failure was raised by the application with
    /// `RAISE EXCEPTION`. The message is in
    /// [`Diagnostics::message_primary`].
    #[must_use]
    pub fn raised_exception(&self) -> bool {
        self.code == codes::RAISED_EXCEPTION
    }

    /// Checks the success precondition shared by row accessors.
    fn require_success(&self, accessor: &'static str) -> Result<(), UsageError> {
        if self.is_error() {
            return Err(UsageError::CalledOnError {
                accessor,
                code: self.code.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
