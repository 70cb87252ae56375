//! Transaction history
//!
//! Every buy, sell, deposit, withdrawal or V recalculation on a stock is
//! recorded as an immutable `TransactionHistory` row. The type is stored as
//! free text; `TransactionKind` names the values the application writes.

use crate::storage::entity::{ConflictPolicy, Entity};
use crate::storage::schema::{self, Table};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const TRANSACTION_WIDTH: usize = 9;
const _: () = assert!(schema::TRANSACTION_COLUMNS.len() == TRANSACTION_WIDTH);

/// Well-known transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Buy,
    Sell,
    RecalcV,
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "BUY",
            TransactionKind::Sell => "SELL",
            TransactionKind::RecalcV => "RECALC_V",
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
        }
    }

    pub fn all() -> &'static [TransactionKind] {
        &[
            TransactionKind::Buy,
            TransactionKind::Sell,
            TransactionKind::RecalcV,
            TransactionKind::Deposit,
            TransactionKind::Withdraw,
        ]
    }
}

impl FromStr for TransactionKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "BUY" => Ok(TransactionKind::Buy),
            "SELL" => Ok(TransactionKind::Sell),
            "RECALC_V" | "RECALC" => Ok(TransactionKind::RecalcV),
            "DEPOSIT" => Ok(TransactionKind::Deposit),
            "WITHDRAW" => Ok(TransactionKind::Withdraw),
            _ => Err(crate::Error::InvalidValue(format!("Unknown transaction type: {}", s))),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded transaction. `stock_id` is not enforced as a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    #[serde(default)]
    pub id: i64,
    pub stock_id: i64,
    /// Epoch millis
    pub date: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub price: f64,
    pub quantity: i64,
    /// Total value of the transaction
    pub amount: f64,
    /// V before the transaction, if it changed V
    pub previous_v: Option<f64>,
    /// V after the transaction, if it changed V
    pub new_v: Option<f64>,
}

impl TransactionHistory {
    pub fn new(
        stock_id: i64,
        date: i64,
        kind: impl Into<String>,
        price: f64,
        quantity: i64,
        amount: f64,
    ) -> Self {
        Self {
            id: 0,
            stock_id,
            date,
            kind: kind.into(),
            price,
            quantity,
            amount,
            previous_v: None,
            new_v: None,
        }
    }

    /// Record the V change caused by this transaction
    pub fn with_v_change(mut self, previous_v: f64, new_v: f64) -> Self {
        self.previous_v = Some(previous_v);
        self.new_v = Some(new_v);
        self
    }

    /// The well-known kind, if the stored type is one
    pub fn known_kind(&self) -> Option<TransactionKind> {
        self.kind.parse().ok()
    }
}

impl Entity for TransactionHistory {
    const TABLE: Table = Table::Transactions;
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Abort;

    fn values(&self) -> Vec<&dyn ToSql> {
        let values: [&dyn ToSql; TRANSACTION_WIDTH] = [
            &self.id,
            &self.stock_id,
            &self.date,
            &self.kind,
            &self.price,
            &self.quantity,
            &self.amount,
            &self.previous_v,
            &self.new_v,
        ];
        values.to_vec()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stock_id: row.get(1)?,
            date: row.get(2)?,
            kind: row.get(3)?,
            price: row.get(4)?,
            quantity: row.get(5)?,
            amount: row.get(6)?,
            previous_v: row.get(7)?,
            new_v: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("buy".parse::<TransactionKind>().unwrap(), TransactionKind::Buy);
        assert_eq!("recalc-v".parse::<TransactionKind>().unwrap(), TransactionKind::RecalcV);
        assert!("split".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_free_text_kind_survives() {
        let tx = TransactionHistory::new(1, 0, "DIVIDEND", 0.0, 0, 12.5);
        assert_eq!(tx.known_kind(), None);

        let tx = TransactionHistory::new(1, 0, TransactionKind::Sell.as_str(), 10.0, 2, 20.0);
        assert_eq!(tx.known_kind(), Some(TransactionKind::Sell));
    }

    #[test]
    fn test_json_field_names() {
        let tx = TransactionHistory::new(3, 1_700_000_000_000, "BUY", 10.0, 1, 10.0).with_v_change(100.0, 110.0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "BUY");
        assert_eq!(json["stockId"], 3);
        assert_eq!(json["previousV"], 100.0);
        assert_eq!(json["newV"], 110.0);
    }
}
