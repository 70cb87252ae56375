pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    dim, error, header, info, money, muted, percent, section, status, success, summary_row, warn,
};
pub use table::{DailyRow, StockRow, TableBuilder, TransactionRow};
pub use theme::{theme, Role, Theme};
