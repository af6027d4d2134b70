// crates/rowpost-client/src/lib.rs
// ============================================================================
// Module: Rowpost Client Library
// Description: Pooled synchronous Postgres client with uniform envelopes.
// Purpose: Acquire, execute, normalize, and release on every code path.
// Dependencies: rowpost-core, postgres, r2d2, r2d2_postgres, tracing
// ============================================================================

//! ## Overview
//! Rowpost Client implements the Postgres side of the access layer: an
//! injectable bounded [`PgPool`], named-parameter binding, dynamic row
//! decoding, failure normalization onto a stable SQLSTATE taxonomy, and the
//! [`Database`] facade whose every operation returns a
//! [`DbResponse`](rowpost_core::DbResponse).
//! Invariants:
//! - Connections are released on every exit path of non-preserving
//!   operations; preserved transactions hold exactly one connection until
//!   the caller resolves them.
//! - No driver failure escapes as an error; only
//!   [`UsageError`](rowpost_core::UsageError) does.
//! - The pool is the only shared mutable resource; a checked-out connection
//!   belongs exclusively to the client that acquired it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bind;
pub mod client;
pub mod config;
mod normalize;
pub mod pool;
mod row;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bind::ParamMap;
pub use client::Database;
pub use config::PoolConfig;
pub use pool::AcquireError;
pub use pool::PgPool;
pub use pool::PoolState;
pub use pool::PooledConn;
