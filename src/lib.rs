//! # vrstore - Portfolio persistence for value rebalancing
//!
//! Typed SQLite-backed storage for a value-rebalancing (VR) stock tracker.
//!
//! vrstore provides:
//! - A fixed four-table schema (stocks, transactions, daily asset history,
//!   per-stock history) described once by column descriptors
//! - Schema identity checks and a forward-only migration chain (v4 → v6)
//! - A typed access layer with point reads, full snapshots and live queries
//! - Backup export and restore as JSON

pub mod stock;
pub mod transaction;
pub mod history;
pub mod backup;
pub mod storage;
pub mod watcher;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use stock::Stock;
pub use transaction::{TransactionHistory, TransactionKind};
pub use history::{DailyAssetHistory, StockHistory};
pub use backup::Backup;
pub use storage::{AsyncStore, Store, StoreBuilder, StoreCallback, StoreStats, Table};
pub use watcher::LiveQuery;

/// Result type alias for vrstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vrstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema identity mismatch: expected {expected}, found {found}")]
    IdentityMismatch { expected: String, found: String },

    #[error("Schema mismatch in table {table}.\n Expected: {expected}\n Found: {found}")]
    SchemaMismatch {
        table: String,
        expected: String,
        found: String,
    },

    #[error("No migration path from version {from} to {to}")]
    MigrationPathMissing { from: u32, to: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Cannot run {operation} on a restricted thread")]
    RestrictedThread { operation: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup format error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    Background(String),
}
