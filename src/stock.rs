//! Stock holdings
//!
//! A `Stock` carries the value-rebalancing state of one holding: the target
//! value `V`, the gradient `G` (percent), the cash pool reserved for the
//! holding, and the position itself.

use crate::storage::entity::{ConflictPolicy, Entity, Identified};
use crate::storage::schema::{self, Table};
use crate::transaction::{TransactionHistory, TransactionKind};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};

const STOCK_WIDTH: usize = 12;
const _: () = assert!(schema::STOCK_COLUMNS.len() == STOCK_WIDTH);

fn default_currency() -> String {
    "KRW".to_string()
}

/// One holding. `id == 0` means "not stored yet"; the store assigns a key on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// Exchange ticker, e.g. "AAPL" or "005930"
    pub ticker: String,
    /// V: target value of the position
    pub v_value: f64,
    /// G: gradient, in percent
    pub g_value: f64,
    /// Cash reserve held for this stock
    pub pool: f64,
    pub quantity: i64,
    #[serde(default)]
    pub invested_principal: f64,
    /// Last known price
    #[serde(default)]
    pub current_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Start of investment, epoch millis
    #[serde(default)]
    pub start_date: i64,
    /// Deposit/withdrawal amount suggested when V is recalculated
    #[serde(default)]
    pub default_recalc_amount: f64,
}

impl Stock {
    /// Create a new, unsaved stock in KRW with zero principal and price
    pub fn new(
        name: impl Into<String>,
        ticker: impl Into<String>,
        v_value: f64,
        g_value: f64,
        pool: f64,
        quantity: i64,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            ticker: ticker.into(),
            v_value,
            g_value,
            pool,
            quantity,
            invested_principal: 0.0,
            current_price: 0.0,
            currency: default_currency(),
            start_date: 0,
            default_recalc_amount: 0.0,
        }
    }

    pub fn with_principal(mut self, invested_principal: f64) -> Self {
        self.invested_principal = invested_principal;
        self
    }

    pub fn with_price(mut self, current_price: f64) -> Self {
        self.current_price = current_price;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_start_date(mut self, start_date: i64) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn with_default_recalc_amount(mut self, amount: f64) -> Self {
        self.default_recalc_amount = amount;
        self
    }

    /// Market value of the shares alone
    pub fn evaluation(&self) -> f64 {
        self.current_price * self.quantity as f64
    }

    /// Market value plus the cash pool
    pub fn current_value(&self) -> f64 {
        self.evaluation() + self.pool
    }

    pub fn is_saved(&self) -> bool {
        self.id != 0
    }

    /// Fold a recorded transaction into the holding.
    ///
    /// Trades move cash between the pool and the position and leave the
    /// principal alone; deposits and withdrawals move both pool and principal.
    /// A V recalculation adopts `new_v` when one is recorded. Types outside
    /// `TransactionKind` leave the stock unchanged.
    pub fn apply(&mut self, transaction: &TransactionHistory) {
        match transaction.known_kind() {
            Some(TransactionKind::Buy) => {
                self.pool -= transaction.amount;
                self.quantity += transaction.quantity;
            }
            Some(TransactionKind::Sell) => {
                self.pool += transaction.amount;
                self.quantity -= transaction.quantity;
            }
            Some(TransactionKind::Deposit) => {
                self.pool += transaction.amount;
                self.invested_principal += transaction.amount;
            }
            Some(TransactionKind::Withdraw) => {
                self.pool -= transaction.amount;
                self.invested_principal -= transaction.amount;
            }
            Some(TransactionKind::RecalcV) => {
                if let Some(new_v) = transaction.new_v {
                    self.v_value = new_v;
                }
            }
            None => {}
        }
    }
}

impl Entity for Stock {
    const TABLE: Table = Table::Stocks;
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Abort;

    fn values(&self) -> Vec<&dyn ToSql> {
        let values: [&dyn ToSql; STOCK_WIDTH] = [
            &self.id,
            &self.name,
            &self.ticker,
            &self.v_value,
            &self.g_value,
            &self.pool,
            &self.quantity,
            &self.invested_principal,
            &self.current_price,
            &self.currency,
            &self.start_date,
            &self.default_recalc_amount,
        ];
        values.to_vec()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            ticker: row.get(2)?,
            v_value: row.get(3)?,
            g_value: row.get(4)?,
            pool: row.get(5)?,
            quantity: row.get(6)?,
            invested_principal: row.get(7)?,
            current_price: row.get(8)?,
            currency: row.get(9)?,
            start_date: row.get(10)?,
            default_recalc_amount: row.get(11)?,
        })
    }
}

impl Identified for Stock {
    fn id(&self) -> i64 {
        self.id
    }
}
