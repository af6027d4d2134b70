// crates/rowpost-core/src/codes.rs
// ============================================================================
// Module: SQLSTATE Codes
// Description: SQLSTATE constants used by the Rowpost error taxonomy.
// Purpose: Give every downstream consumer a stable code set to branch on.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The envelope classifies every outcome with a SQLSTATE string. Server-side
//! failures pass their SQLSTATE through unchanged; client-side failures are
//! mapped onto the connection-exception class (`08xxx`) or synthesized with
//! an empty code. The constants here cover the codes Rowpost itself emits or
//! exposes through named predicates; any other SQLSTATE flows through the
//! envelope untouched.

/// Successful completion.
pub const SUCCESS: &str = "00000";

/// Warning class; emitted for parameter-binding mismatches with a hint.
pub const WARNING: &str = "01000";

/// Connection exception: any connection-establishment failure not covered
/// by a more specific `08xxx` code.
pub const CONNECTION_EXCEPTION: &str = "08000";

/// The client was unable to establish the connection: bad credentials,
/// unreachable host or port, or a connect timeout.
pub const UNABLE_TO_CONNECT: &str = "08001";

/// Connection does not exist: the pool is exhausted or a connection is
/// dangling (a preserved transaction was never committed or released).
pub const CONNECTION_DOES_NOT_EXIST: &str = "08003";

/// Invalid parameter value; emitted when the paginated operation is called
/// without an `offset` parameter.
pub const INVALID_PARAMETER: &str = "22010";

/// Unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Foreign key constraint violation.
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// System error; emitted for internal inconsistencies such as a count query
/// returning no rows.
pub const SYSTEM_ERROR: &str = "58000";

/// Application-raised database exception (`RAISE EXCEPTION` in PL/pgSQL).
pub const RAISED_EXCEPTION: &str = "P0001";
