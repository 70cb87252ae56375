//! Valuation history
//!
//! - `DailyAssetHistory`: one aggregate snapshot per calendar date, keyed by
//!   the date string and upserted so today's value can be recomputed
//! - `StockHistory`: append-only point-in-time snapshots of a single stock

use crate::stock::Stock;
use crate::storage::entity::{ConflictPolicy, Entity};
use crate::storage::schema::{self, Table};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};

const DAILY_WIDTH: usize = 3;
const _: () = assert!(schema::DAILY_ASSET_HISTORY_COLUMNS.len() == DAILY_WIDTH);

const STOCK_HISTORY_WIDTH: usize = 9;
const _: () = assert!(schema::STOCK_HISTORY_COLUMNS.len() == STOCK_HISTORY_WIDTH);

/// Portfolio totals for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAssetHistory {
    /// Format: YYYY-MM-DD
    pub date: String,
    pub total_principal: f64,
    pub total_current_value: f64,
}

impl DailyAssetHistory {
    pub fn new(date: impl Into<String>, total_principal: f64, total_current_value: f64) -> Self {
        Self {
            date: date.into(),
            total_principal,
            total_current_value,
        }
    }

    /// Sum principal and current value (shares plus pool) over all holdings.
    ///
    /// Amounts are added as-is; callers holding several currencies convert
    /// before summing.
    pub fn from_stocks(date: impl Into<String>, stocks: &[Stock]) -> Self {
        let total_principal = stocks.iter().map(|s| s.invested_principal).sum();
        let total_current_value = stocks.iter().map(Stock::current_value).sum();
        Self::new(date, total_principal, total_current_value)
    }

    /// Gain relative to principal, in percent; zero when nothing is invested
    pub fn return_rate(&self) -> f64 {
        if self.total_principal == 0.0 {
            0.0
        } else {
            (self.total_current_value - self.total_principal) / self.total_principal * 100.0
        }
    }
}

impl Entity for DailyAssetHistory {
    const TABLE: Table = Table::DailyAssetHistory;
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Replace;

    fn values(&self) -> Vec<&dyn ToSql> {
        let values: [&dyn ToSql; DAILY_WIDTH] =
            [&self.date, &self.total_principal, &self.total_current_value];
        values.to_vec()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            total_principal: row.get(1)?,
            total_current_value: row.get(2)?,
        })
    }
}

/// Snapshot of one stock's VR state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockHistory {
    #[serde(default)]
    pub id: i64,
    pub stock_id: i64,
    /// Epoch millis
    pub timestamp: i64,
    pub v_value: f64,
    pub g_value: f64,
    pub current_price: f64,
    pub quantity: i64,
    pub pool: f64,
    pub invested_principal: f64,
}

impl StockHistory {
    /// Snapshot the current state of `stock`
    pub fn capture(stock: &Stock, timestamp: i64) -> Self {
        Self {
            id: 0,
            stock_id: stock.id,
            timestamp,
            v_value: stock.v_value,
            g_value: stock.g_value,
            current_price: stock.current_price,
            quantity: stock.quantity,
            pool: stock.pool,
            invested_principal: stock.invested_principal,
        }
    }
}

impl Entity for StockHistory {
    const TABLE: Table = Table::StockHistory;
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Abort;

    fn values(&self) -> Vec<&dyn ToSql> {
        let values: [&dyn ToSql; STOCK_HISTORY_WIDTH] = [
            &self.id,
            &self.stock_id,
            &self.timestamp,
            &self.v_value,
            &self.g_value,
            &self.current_price,
            &self.quantity,
            &self.pool,
            &self.invested_principal,
        ];
        values.to_vec()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stock_id: row.get(1)?,
            timestamp: row.get(2)?,
            v_value: row.get(3)?,
            g_value: row.get(4)?,
            current_price: row.get(5)?,
            quantity: row.get(6)?,
            pool: row.get(7)?,
            invested_principal: row.get(8)?,
        })
    }
}
