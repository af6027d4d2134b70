// crates/rowpost-client/src/client.rs
// ============================================================================
// Module: Database Client
// Description: The access-layer facade over pool, binding, and normalization.
// Purpose: Execute statements and return uniform envelopes on every path.
// Dependencies: postgres, postgres-types, rowpost-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`Database`] is the facade callers use. Every operation follows the same
//! skeleton: acquire a connection (or reuse the preserved one), execute,
//! build a [`DbResponse`], release. Release is structural: a checked-out
//! connection is returned to the pool when it goes out of scope, so it
//! happens on every exit path, success or failure, unless the caller is
//! deliberately holding a preserved transaction open.
//!
//! No driver failure escapes an operation as an error: each one is
//! normalized, logged with the client's caller-context label and the
//! executed statement, and folded into the envelope. The only `Err` this
//! API produces is [`UsageError`] for programmer misuse, such as committing
//! with no preserved transaction.
//!
//! ## Preserved transactions
//! `execute_preserved` and `execute_many_preserved` run inside a
//! transaction that stays open on this client across calls. At most one
//! exists per client; further preserved calls reuse the same connection. The
//! caller must eventually call [`Database::commit`], [`Database::rollback`]
//! or [`Database::release`]: a client kept alive with an unresolved
//! preserved transaction keeps a pooled connection checked out indefinitely
//! and will eventually exhaust the pool. Always pair preserved calls with a
//! cleanup path that runs on every exit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Client;
use postgres_types::ToSql;
use serde_json::Value;

use rowpost_core::DbResponse;
use rowpost_core::RowMap;
use rowpost_core::UsageError;

use crate::bind::BULK_PAGE_SIZE;
use crate::bind::BindValue;
use crate::bind::BulkPlan;
use crate::bind::ParamMap;
use crate::bind::bind_values;
use crate::bind::bulk_plan;
use crate::bind::rewrite_named;
use crate::bind::values_groups;
use crate::normalize::OpError;
use crate::normalize::normalize;
use crate::pool::PgPool;
use crate::pool::PooledConn;

// ============================================================================
// SECTION: Preserved Transaction
// ============================================================================

/// A connection deliberately held open across multiple calls.
///
/// # Invariants
/// - The held connection has an open transaction started with `BEGIN`.
/// - Dropping this value returns the connection to the pool without
///   resolving the transaction; [`Database`] controls when that happens.
struct PreservedTransaction {
    /// The single connection checked out for the transaction.
    conn: PooledConn,
}

impl std::fmt::Debug for PreservedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreservedTransaction").finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Database Client
// ============================================================================

/// The pooled Postgres client facade.
///
/// Each instance borrows connections from an injected [`PgPool`] per
/// logical operation. Instances are cheap; create one per unit of work and
/// share the pool, not the client.
#[derive(Debug)]
pub struct Database {
    /// The shared pool connections are borrowed from.
    pool: PgPool,
    /// The open preserved transaction, if any.
    preserved: Option<PreservedTransaction>,
    /// Whether server notices are captured into envelopes.
    notices: bool,
    /// Whether successfully executed statements are logged.
    log_statements: bool,
    /// Caller-context label attached to every log event.
    context: String,
}

impl Database {
    /// Creates a client over an injected pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_context(pool, "rowpost")
    }

    /// Creates a client with an explicit caller-context label used in logs.
    #[must_use]
    pub fn with_context(pool: PgPool, context: impl Into<String>) -> Self {
        Self {
            pool,
            preserved: None,
            notices: false,
            log_statements: false,
            context: context.into(),
        }
    }

    /// Enables or disables capturing server notices into envelopes.
    pub const fn set_notices(&mut self, enabled: bool) {
        self.notices = enabled;
    }

    /// Enables or disables logging of successfully executed statements.
    pub const fn set_log_statements(&mut self, enabled: bool) {
        self.log_statements = enabled;
    }

    /// Returns `true` while a preserved transaction is open.
    #[must_use]
    pub const fn has_preserved(&self) -> bool {
        self.preserved.is_some()
    }

    /// Executes a single auto-committing statement.
    ///
    /// On failure nothing is committed; the connection is returned to the
    /// pool and the envelope carries the normalized failure.
    pub fn execute(&mut self, query: &str, params: &ParamMap) -> DbResponse {
        self.begin_op();
        match self.try_single(query, params) {
            Ok(rows) => self.ok_envelope("execute", query, rows),
            Err(error) => self.err_envelope("execute", query, &error),
        }
    }

    /// Executes a bulk statement: one multi-row `VALUES` list per page of
    /// rows, all pages inside one transaction committed at the end.
    ///
    /// The statement binds its rows through a single `:rows` placeholder,
    /// for example `INSERT INTO t (a, b) VALUES :rows`. An empty row list
    /// is a no-op success that never touches the pool. On failure the
    /// transaction is rolled back before the connection is returned, so a
    /// partial bulk application never persists.
    pub fn execute_many(&mut self, query: &str, rows: &[Vec<Value>]) -> DbResponse {
        self.begin_op();
        if rows.is_empty() {
            return self.ok_envelope("execute_many", query, Vec::new());
        }
        match self.try_bulk(query, rows) {
            Ok(out) => self.ok_envelope("execute_many", query, out),
            Err(error) => self.err_envelope("execute_many", query, &error),
        }
    }

    /// Executes a page query and its derived total-count query in one call.
    ///
    /// `params` must contain an `offset` key or the call fails fast with
    /// the invalid-parameter code and a zero total count, without touching
    /// the connection. The query must be supplied without its own
    /// `LIMIT`/`OFFSET`; the helper appends `LIMIT <page_size> OFFSET
    /// :offset` and wraps the original query in `SELECT COUNT(*)` for the
    /// total. Row ordering is whatever the query specifies.
    pub fn execute_paginated(
        &mut self,
        query: &str,
        params: &ParamMap,
        page_size: u32,
    ) -> DbResponse {
        self.begin_op();
        if !params.contains_key("offset") {
            return self
                .err_envelope("execute_paginated", query, &OpError::MissingOffset)
                .with_total_count(0);
        }
        match self.try_paginated(query, params, page_size) {
            Ok((rows, total)) => {
                self.ok_envelope("execute_paginated", query, rows).with_total_count(total)
            }
            Err(error) => self.err_envelope("execute_paginated", query, &error),
        }
    }

    /// Executes a statement inside the preserved transaction, opening it on
    /// first use, without committing or releasing.
    ///
    /// See the module documentation for the cleanup obligation this places
    /// on the caller.
    pub fn execute_preserved(&mut self, query: &str, params: &ParamMap) -> DbResponse {
        self.begin_op();
        match self.try_preserved_single(query, params) {
            Ok(rows) => self.ok_envelope("execute_preserved", query, rows),
            Err(error) => self.err_envelope("execute_preserved", query, &error),
        }
    }

    /// Executes a bulk statement inside the preserved transaction, opening
    /// it on first use, without committing or releasing.
    pub fn execute_many_preserved(&mut self, query: &str, rows: &[Vec<Value>]) -> DbResponse {
        self.begin_op();
        match self.try_preserved_bulk(query, rows) {
            Ok(out) => self.ok_envelope("execute_many_preserved", query, out),
            Err(error) => self.err_envelope("execute_many_preserved", query, &error),
        }
    }

    /// Commits the preserved transaction and returns its connection.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NoPreservedTransaction`] when no preserved
    /// transaction is open. A commit failure reported by the server is a
    /// database failure, not misuse, and comes back inside the envelope.
    pub fn commit(&mut self) -> Result<DbResponse, UsageError> {
        let mut tx = self.preserved.take().ok_or(UsageError::NoPreservedTransaction)?;
        self.begin_op();
        let result = tx.conn.batch_execute("COMMIT");
        drop(tx);
        Ok(match result {
            Ok(()) => self.ok_envelope("commit", "COMMIT", Vec::new()),
            Err(error) => self.err_envelope("commit", "COMMIT", &OpError::Driver(error)),
        })
    }

    /// Rolls back the preserved transaction and returns its connection.
    ///
    /// Rollback is routinely called defensively from cleanup paths, so a
    /// missing preserved transaction is logged rather than surfaced.
    pub fn rollback(&mut self) {
        let Some(mut tx) = self.preserved.take() else {
            tracing::warn!(
                target: "rowpost",
                context = %self.context,
                "rollback called with no preserved transaction"
            );
            return;
        };
        if let Err(error) = tx.conn.batch_execute("ROLLBACK") {
            tracing::error!(
                target: "rowpost",
                context = %self.context,
                error = %error,
                "failed to roll back preserved transaction"
            );
        }
    }

    /// Unconditionally returns the preserved connection to the pool without
    /// commit or rollback side effects, for cleanup after the caller has
    /// already resolved the transaction. Calling it with nothing preserved
    /// is a no-op, so it is safe on every exit path.
    pub fn release(&mut self) {
        self.preserved = None;
    }

    // ------------------------------------------------------------------
    // Operation bodies
    // ------------------------------------------------------------------

    /// Runs one statement on a freshly acquired connection.
    fn try_single(&mut self, query: &str, params: &ParamMap) -> Result<Vec<RowMap>, OpError> {
        let rewritten = rewrite_named(query);
        let values = bind_values(&rewritten.names, params)
            .map_err(|missing| binding_mismatch(missing, params))?;
        let mut conn = self.pool.acquire().map_err(OpError::Acquire)?;
        run_statement(&mut conn, &rewritten.sql, &values)
    }

    /// Runs the page and count queries on one acquired connection.
    fn try_paginated(
        &mut self,
        query: &str,
        params: &ParamMap,
        page_size: u32,
    ) -> Result<(Vec<RowMap>, u64), OpError> {
        let base = query.trim_end().trim_end_matches(';').trim_end();
        // The clause and the wrapper's closing paren go on their own lines
        // so a trailing -- comment in the caller's query cannot swallow them.
        let page = rewrite_named(&format!("{base}\nLIMIT {page_size} OFFSET :offset"));
        let count = rewrite_named(&format!("SELECT COUNT(*) AS total FROM (\n{base}\n) AS total"));
        let page_values = bind_values(&page.names, params)
            .map_err(|missing| binding_mismatch(missing, params))?;
        let count_values = bind_values(&count.names, params)
            .map_err(|missing| binding_mismatch(missing, params))?;
        let mut conn = self.pool.acquire().map_err(OpError::Acquire)?;
        let rows = run_statement(&mut conn, &page.sql, &page_values)?;
        let count_rows = run_statement(&mut conn, &count.sql, &count_values)?;
        let total = count_rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_i64)
            .and_then(|total| u64::try_from(total).ok())
            .ok_or_else(|| OpError::Internal("count query returned no total".to_string()))?;
        Ok((rows, total))
    }

    /// Runs a bulk statement inside its own transaction, rolling back on
    /// failure before the connection is returned.
    fn try_bulk(&mut self, query: &str, rows: &[Vec<Value>]) -> Result<Vec<RowMap>, OpError> {
        let plan =
            bulk_plan(query).map_err(|placeholders| OpError::BulkMarker { placeholders })?;
        validate_bulk_rows(rows)?;
        let mut conn = self.pool.acquire().map_err(OpError::Acquire)?;
        conn.batch_execute("BEGIN").map_err(OpError::Driver)?;
        match run_bulk(&mut conn, &plan, rows) {
            Ok(out) => {
                conn.batch_execute("COMMIT").map_err(OpError::Driver)?;
                Ok(out)
            }
            Err(error) => {
                if let Err(rollback_error) = conn.batch_execute("ROLLBACK") {
                    tracing::warn!(
                        target: "rowpost",
                        context = %self.context,
                        error = %rollback_error,
                        "failed to roll back bulk statement"
                    );
                }
                Err(error)
            }
        }
    }

    /// Runs one statement on the preserved transaction's connection.
    fn try_preserved_single(
        &mut self,
        query: &str,
        params: &ParamMap,
    ) -> Result<Vec<RowMap>, OpError> {
        let rewritten = rewrite_named(query);
        let values = bind_values(&rewritten.names, params)
            .map_err(|missing| binding_mismatch(missing, params))?;
        let client = self.preserved_client()?;
        run_statement(client, &rewritten.sql, &values)
    }

    /// Runs a bulk statement on the preserved transaction's connection.
    fn try_preserved_bulk(
        &mut self,
        query: &str,
        rows: &[Vec<Value>],
    ) -> Result<Vec<RowMap>, OpError> {
        if rows.is_empty() {
            self.preserved_client()?;
            return Ok(Vec::new());
        }
        let plan =
            bulk_plan(query).map_err(|placeholders| OpError::BulkMarker { placeholders })?;
        validate_bulk_rows(rows)?;
        let client = self.preserved_client()?;
        run_bulk(client, &plan, rows)
    }

    /// Returns the preserved connection, opening the transaction on first
    /// use. At most one preserved transaction exists per client; repeated
    /// calls reuse the same connection.
    fn preserved_client(&mut self) -> Result<&mut Client, OpError> {
        if self.preserved.is_none() {
            let mut conn = self.pool.acquire().map_err(OpError::Acquire)?;
            conn.batch_execute("BEGIN").map_err(OpError::Driver)?;
            self.preserved = Some(PreservedTransaction { conn });
        }
        self.preserved.as_mut().map_or_else(
            || Err(OpError::Internal("preserved transaction missing".to_string())),
            |tx| Ok(&mut *tx.conn),
        )
    }

    // ------------------------------------------------------------------
    // Envelope assembly
    // ------------------------------------------------------------------

    /// Discards stale notices before an operation when capture is enabled.
    fn begin_op(&self) {
        if self.notices {
            self.pool.clear_notices();
        }
    }

    /// Builds a success envelope, logging the statement when enabled.
    fn ok_envelope(
        &self,
        operation: &'static str,
        statement: &str,
        rows: Vec<RowMap>,
    ) -> DbResponse {
        if self.log_statements {
            tracing::debug!(
                target: "rowpost",
                context = %self.context,
                operation,
                statement,
                "statement executed"
            );
        }
        self.attach_notices(DbResponse::success(rows))
    }

    /// Normalizes a failure, logs it with caller context, and builds the
    /// failure envelope.
    fn err_envelope(
        &self,
        operation: &'static str,
        statement: &str,
        error: &OpError,
    ) -> DbResponse {
        let normalized = normalize(error);
        tracing::error!(
            target: "rowpost",
            context = %self.context,
            operation,
            code = %normalized.code,
            statement,
            "database operation failed: {}",
            normalized.message
        );
        let mut envelope = DbResponse::failure(normalized.code, normalized.message);
        if let Some(diagnostics) = normalized.diagnostics {
            envelope = envelope.with_diagnostics(diagnostics);
        }
        self.attach_notices(envelope)
    }

    /// Attaches captured notices to an envelope when capture is enabled.
    fn attach_notices(&self, envelope: DbResponse) -> DbResponse {
        if self.notices {
            envelope.with_notices(self.pool.take_notices())
        } else {
            envelope
        }
    }
}

// ============================================================================
// SECTION: Statement Execution
// ============================================================================

/// Builds the binding-mismatch failure naming missing and supplied keys.
fn binding_mismatch(missing: Vec<String>, params: &ParamMap) -> OpError {
    OpError::BindingMismatch {
        missing,
        supplied: params.keys().cloned().collect(),
    }
}

/// Checks that every bulk row matches the width of the first row.
fn validate_bulk_rows(rows: &[Vec<Value>]) -> Result<(), OpError> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let expected = first.len();
    if expected == 0 {
        return Err(OpError::BulkShape {
            row_index: 0,
            expected: 1,
            found: 0,
        });
    }
    for (row_index, row) in rows.iter().enumerate() {
        if row.len() != expected {
            return Err(OpError::BulkShape {
                row_index,
                expected,
                found: row.len(),
            });
        }
    }
    Ok(())
}

/// Executes one positional statement and decodes its rows.
fn run_statement(
    client: &mut Client,
    sql: &str,
    values: &[BindValue<'_>],
) -> Result<Vec<RowMap>, OpError> {
    let params: Vec<&(dyn ToSql + Sync)> =
        values.iter().map(|value| value as &(dyn ToSql + Sync)).collect();
    let rows = client.query(sql, &params).map_err(OpError::Driver)?;
    crate::row::rows_to_maps(&rows).map_err(OpError::Driver)
}

/// Executes a validated bulk statement one page at a time.
fn run_bulk(
    client: &mut Client,
    plan: &BulkPlan,
    rows: &[Vec<Value>],
) -> Result<Vec<RowMap>, OpError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let width = first.len();
    let mut out = Vec::new();
    for chunk in rows.chunks(BULK_PAGE_SIZE) {
        let sql =
            format!("{}{}{}", plan.prefix, values_groups(width, chunk.len()), plan.suffix);
        let values: Vec<BindValue<'_>> =
            chunk.iter().flat_map(|row| row.iter().map(BindValue)).collect();
        out.extend(run_statement(client, &sql, &values)?);
    }
    Ok(out)
}
