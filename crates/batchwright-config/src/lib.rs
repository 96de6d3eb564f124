// crates/batchwright-config/src/lib.rs
// ============================================================================
// Module: Batchwright Config Library
// Description: Canonical config model and strict TOML loading.
// Purpose: Single source of truth for batchwright.toml semantics.
// Dependencies: batchwright-core, batchwright-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `batchwright-config` defines the configuration file read by deployments of
//! the bulk-write coordinator: executor tuning under `[executor]` and the
//! `SQLite` handle under `[store]`. Loading is fail-closed: oversized,
//! non-UTF-8, or unknown-key inputs are rejected before any store is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
