use crate::ui::output::money;
use crate::{DailyAssetHistory, Stock, TransactionHistory};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Two-column metric/value table
#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: impl ToString) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        render(&self.rows)
    }
}

/// Render rows with the shared table style; empty input renders nothing
pub fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
pub struct StockRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Ticker")]
    pub ticker: String,
    #[tabled(rename = "Qty")]
    pub quantity: i64,
    #[tabled(rename = "Price")]
    pub price: String,
    #[tabled(rename = "V")]
    pub v_value: String,
    #[tabled(rename = "G %")]
    pub g_value: String,
    #[tabled(rename = "Pool")]
    pub pool: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Cur")]
    pub currency: String,
}

impl From<&Stock> for StockRow {
    fn from(stock: &Stock) -> Self {
        Self {
            id: stock.id,
            name: stock.name.clone(),
            ticker: stock.ticker.clone(),
            quantity: stock.quantity,
            price: money(stock.current_price),
            v_value: money(stock.v_value),
            g_value: format!("{}", stock.g_value),
            pool: money(stock.pool),
            value: money(stock.current_value()),
            currency: stock.currency.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct TransactionRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Price")]
    pub price: String,
    #[tabled(rename = "Qty")]
    pub quantity: i64,
    #[tabled(rename = "Amount")]
    pub amount: String,
    #[tabled(rename = "V change")]
    pub v_change: String,
}

impl TransactionRow {
    /// `date` is pre-formatted by the caller
    pub fn new(tx: &TransactionHistory, date: String) -> Self {
        let v_change = match (tx.previous_v, tx.new_v) {
            (Some(prev), Some(new)) => format!("{} → {}", money(prev), money(new)),
            _ => String::new(),
        };
        Self {
            id: tx.id,
            date,
            kind: tx.kind.clone(),
            price: money(tx.price),
            quantity: tx.quantity,
            amount: money(tx.amount),
            v_change,
        }
    }
}

#[derive(Tabled)]
pub struct DailyRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Principal")]
    pub principal: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Return")]
    pub return_rate: String,
}

impl From<&DailyAssetHistory> for DailyRow {
    fn from(day: &DailyAssetHistory) -> Self {
        Self {
            date: day.date.clone(),
            principal: money(day.total_principal),
            value: money(day.total_current_value),
            return_rate: format!("{:+.2}%", day.return_rate()),
        }
    }
}
