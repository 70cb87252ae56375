//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - stocks(id, name, ticker, vValue, gValue, pool, quantity, ...)
//! - transactions(id, stockId, date, type, price, quantity, amount, previousV, newV)
//! - daily_asset_history(date, totalPrincipal, totalCurrentValue)
//! - stock_history(id, stockId, timestamp, vValue, gValue, currentPrice, ...)
//!
//! plus `store_master`, which holds the schema identity hash.

pub mod schema;
pub mod entity;
pub mod migration;
pub mod guard;
pub mod lifecycle;
pub mod sqlite;
pub mod async_store;

pub use async_store::AsyncStore;
pub use lifecycle::{OpenOutcome, StoreCallback};
pub use migration::{Migration, MigrationChain};
pub use schema::Table;
pub use sqlite::{Store, StoreBuilder, StoreStats};
