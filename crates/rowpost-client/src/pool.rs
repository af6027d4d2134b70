// crates/rowpost-client/src/pool.rs
// ============================================================================
// Module: Connection Pool
// Description: Injectable bounded pool of live Postgres connections.
// Purpose: Hand out exclusive connections with typed acquisition failures.
// Dependencies: postgres, r2d2, r2d2_postgres, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`PgPool`] wraps a bounded r2d2 pool of synchronous Postgres connections.
//! It is constructed explicitly from a [`PoolConfig`] and injected into each
//! client; its lifecycle belongs to the process entry point (dropping the
//! last handle drains idle connections).
//!
//! A construction failure (for example an unreachable server while
//! establishing the configured minimum connections) is captured and
//! remembered: every later [`PgPool::acquire`] deterministically surfaces
//! the captured failure instead of retrying a dead server. Acquisition
//! failures are returned as typed [`AcquireError`] values so callers can
//! classify them without inspecting driver internals: connection
//! establishment problems, pool exhaustion (or a dangling preserved
//! connection that was never released), and everything else.
//!
//! Release is RAII: dropping a [`PooledConn`] returns it to the idle set,
//! so release happens on every exit path; teardown problems are logged by
//! the pool's error handler and never mask an operation's result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use thiserror::Error;

use crate::config::PoolConfig;

// ============================================================================
// SECTION: Types
// ============================================================================

/// The connection manager used by every pool.
type Manager = PostgresConnectionManager<NoTls>;

/// An exclusively checked-out connection; returns to the pool on drop.
pub type PooledConn = r2d2::PooledConnection<Manager>;

/// Typed acquisition failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling and map one-to-one onto
///   the connection-exception code taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The client was unable to establish a connection: bad credentials,
    /// unreachable host or port, or a connect timeout.
    #[error("unable to establish connection: {0}")]
    Unreachable(String),
    /// The pool is exhausted, or a connection is dangling because a
    /// preserved transaction was never committed or released.
    #[error("connection pool exhausted or connection dangling: {0}")]
    Exhausted(String),
    /// Any other connection-establishment failure.
    #[error("connection attempt failed: {0}")]
    Other(String),
}

/// A point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Total live connections, checked out or idle.
    pub connections: u32,
    /// Connections currently idle in the pool.
    pub idle_connections: u32,
}

// ============================================================================
// SECTION: Shared Slots
// ============================================================================

/// State shared between the pool handle, its error handler, and the
/// driver's notice callback.
#[derive(Debug, Default)]
struct SharedSlots {
    /// Most recent connection-establishment failure, if any.
    last_connect_error: Mutex<Option<String>>,
    /// Server notices captured since the buffer was last drained.
    notices: Mutex<Vec<String>>,
}

/// Pool error handler feeding the last-connect-error slot.
#[derive(Debug)]
struct ConnectErrorSink {
    /// Slots shared with the owning pool handle.
    slots: Arc<SharedSlots>,
}

impl r2d2::HandleError<postgres::Error> for ConnectErrorSink {
    fn handle_error(&self, error: postgres::Error) {
        tracing::warn!(target: "rowpost", error = %error, "pool connection error");
        if let Ok(mut slot) = self.slots.last_connect_error.lock() {
            *slot = Some(error.to_string());
        }
    }
}

// ============================================================================
// SECTION: Pool
// ============================================================================

/// Injectable bounded pool of live Postgres connections.
///
/// Cloning is cheap and every clone shares the same underlying pool.
#[derive(Clone)]
pub struct PgPool {
    /// The live pool, or the remembered construction failure.
    inner: Result<r2d2::Pool<Manager>, AcquireError>,
    /// Slots shared with the error handler and notice callback.
    slots: Arc<SharedSlots>,
}

impl fmt::Debug for PgPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("PgPool")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .field("construction_error", &self.construction_error())
            .finish()
    }
}

impl PgPool {
    /// Builds a pool from the configuration.
    ///
    /// The handle is always returned; a construction failure is captured
    /// inside it and surfaced by every [`PgPool::acquire`] until the
    /// process restarts with a reachable server. Establishment of the
    /// configured minimum connections happens here, bounded by the connect
    /// and acquire timeouts.
    #[must_use]
    pub fn connect(config: &PoolConfig) -> Self {
        let slots = Arc::new(SharedSlots::default());
        let mut pg_config = match config.connection.parse::<postgres::Config>() {
            Ok(parsed) => parsed,
            Err(err) => {
                let error = AcquireError::Other(format!("invalid connection string: {err}"));
                tracing::warn!(target: "rowpost", error = %error, "pool construction failed");
                return Self {
                    inner: Err(error),
                    slots,
                };
            }
        };
        pg_config.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);
        let notice_slots = Arc::clone(&slots);
        pg_config.notice_callback(move |notice| {
            if let Ok(mut buffer) = notice_slots.notices.lock() {
                buffer.push(notice.message().to_string());
            }
        });
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let result = r2d2::Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .error_handler(Box::new(ConnectErrorSink {
                slots: Arc::clone(&slots),
            }))
            .build(manager);
        match result {
            Ok(pool) => Self {
                inner: Ok(pool),
                slots,
            },
            Err(err) => {
                let error = classify_construction(err.to_string(), &slots);
                tracing::warn!(target: "rowpost", error = %error, "pool construction failed");
                Self {
                    inner: Err(error),
                    slots,
                }
            }
        }
    }

    /// Checks out a connection, blocking up to the acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns the remembered construction failure,
    /// [`AcquireError::Unreachable`] when the server cannot be reached, or
    /// [`AcquireError::Exhausted`] when every connection stayed checked out
    /// for the full acquire timeout.
    pub fn acquire(&self) -> Result<PooledConn, AcquireError> {
        match &self.inner {
            Err(error) => Err(error.clone()),
            Ok(pool) => {
                pool.get().map_err(|err| classify_acquire(err.to_string(), &self.slots))
            }
        }
    }

    /// Returns the remembered construction failure, if any.
    #[must_use]
    pub fn construction_error(&self) -> Option<&AcquireError> {
        self.inner.as_ref().err()
    }

    /// Returns a snapshot of pool occupancy.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.as_ref().map_or(
            PoolState {
                connections: 0,
                idle_connections: 0,
            },
            |pool| {
                let state = pool.state();
                PoolState {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            },
        )
    }

    /// Discards any notices captured before an operation begins.
    pub(crate) fn clear_notices(&self) {
        if let Ok(mut buffer) = self.slots.notices.lock() {
            buffer.clear();
        }
    }

    /// Drains the notices captured since the last clear.
    pub(crate) fn take_notices(&self) -> Vec<String> {
        self.slots.notices.lock().map(|mut buffer| std::mem::take(&mut *buffer)).unwrap_or_default()
    }
}

/// Classifies an acquisition failure using the last connect error seen by
/// the pool's error handler: establishment failures beat exhaustion, and a
/// timeout with no establishment failure means every connection stayed
/// checked out.
fn classify_acquire(message: String, slots: &SharedSlots) -> AcquireError {
    take_connect_error(slots)
        .map_or_else(|| AcquireError::Exhausted(message), AcquireError::Unreachable)
}

/// Classifies a construction failure: an establishment failure seen while
/// building the minimum connections is remembered as unreachable, anything
/// else falls into the catch-all connection-exception class.
fn classify_construction(message: String, slots: &SharedSlots) -> AcquireError {
    take_connect_error(slots)
        .map_or_else(|| AcquireError::Other(message), AcquireError::Unreachable)
}

/// Takes the most recent connection-establishment failure, if any.
fn take_connect_error(slots: &SharedSlots) -> Option<String> {
    slots.last_connect_error.lock().ok().and_then(|mut slot| slot.take())
}

#[cfg(test)]
mod tests;
