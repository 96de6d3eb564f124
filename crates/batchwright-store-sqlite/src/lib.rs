// crates/batchwright-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Transactional Handle
// Description: Durable TransactionalHandle backend using SQLite.
// Purpose: Persist bulk-written records with per-window transactions.
// Dependencies: batchwright-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`batchwright_core::TransactionalHandle`].
//! Each commit window maps to one `BEGIN IMMEDIATE .. COMMIT` span and each
//! mutation runs inside its own savepoint, so a rejected mutation leaves the
//! rest of the window intact. Unique property constraints are enforced by a
//! side table.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteHandle;
pub use store::SqliteHandleStats;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
