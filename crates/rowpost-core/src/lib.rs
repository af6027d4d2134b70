// crates/rowpost-core/src/lib.rs
// ============================================================================
// Module: Rowpost Core Library
// Description: Driver-independent value model for the Rowpost access layer.
// Purpose: Define the result envelope, SQLSTATE taxonomy, and usage errors.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Rowpost Core defines the uniform [`DbResponse`] envelope returned by every
//! database operation, the SQLSTATE [`codes`] the envelope classifies
//! failures with, the [`Diagnostics`] record for deeper failure
//! introspection, and the [`UsageError`] type for programmer-usage mistakes.
//! Invariants:
//! - Envelopes are immutable once constructed; accessors never mutate.
//! - `rows` is always a concrete (possibly empty) sequence, never absent.
//! - Driver failures are carried inside envelopes; only [`UsageError`]
//!   surfaces as an `Err` from the client API.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codes;
pub mod diagnostics;
pub mod envelope;
pub mod error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use diagnostics::Diagnostics;
pub use envelope::DbResponse;
pub use envelope::RowMap;
pub use error::UsageError;
