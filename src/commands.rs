use crate::{Context, OutputMode, emit_success};
use std::path::Path;
use vrstore::config;
use vrstore::ui::{self, Icons, TableBuilder, money, percent, section, success, summary_row};
use vrstore::ui::table::{render, DailyRow, StockRow, TransactionRow};
use vrstore::{Backup, DailyAssetHistory, Stock, StockHistory, TransactionHistory, TransactionKind};

/// Parse `YYYY-MM-DD` into epoch milliseconds at UTC midnight
pub fn parse_date_millis(date: &str) -> anyhow::Result<i64> {
    let day = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date '{}': {}", date, e))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date '{}'", date))?;
    Ok(midnight.and_utc().timestamp_millis())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn require_stock(store: &vrstore::Store, id: i64) -> anyhow::Result<Stock> {
    store
        .get_stock(id)?
        .ok_or_else(|| anyhow::anyhow!("no stock with id {}", id))
}

pub fn run_init(ctx: &Context, force: bool, mode: OutputMode) -> anyhow::Result<()> {
    config::write_config(&ctx.config_path, &ctx.config, force)?;
    let store = ctx.open_store()?;
    let stats = store.stats()?;

    if mode.is_human() {
        success(&format!("Wrote {}", ctx.config_path.display()));
        ui::status(Icons::DATABASE, "Database", &ctx.database.display().to_string());
        ui::status(Icons::INFO, "Schema version", &stats.schema_version.to_string());
    }
    emit_success(
        mode,
        "init",
        serde_json::json!({
            "config": ctx.config_path,
            "database": ctx.database,
            "schemaVersion": stats.schema_version,
        }),
    )
}

pub fn run_status(ctx: &Context, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats()?;

    if mode.is_human() {
        ui::header(&format!("vrstore ({})", ctx.database.display()));
        let mut table = TableBuilder::new();
        table.add_row("Schema version", stats.schema_version);
        table.add_row("Open", format!("{:?}", store.open_outcome()));
        table.add_row("Stocks", stats.stocks);
        table.add_row("Transactions", stats.transactions);
        table.add_row("Daily history", stats.daily_history);
        table.add_row("Stock history", stats.stock_history);
        println!("{}", table.build());
        summary_row("Identity", &ui::muted(&stats.identity_hash));
    }
    emit_success(mode, "status", serde_json::to_value(&stats)?)
}

pub fn run_stocks(ctx: &Context, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let mut stocks = store.all_stocks_snapshot()?;
    stocks.sort_by_key(|s| s.id);

    if mode.is_human() {
        if stocks.is_empty() {
            ui::info("Stocks", "none yet, add one with `vrstore add-stock`");
        } else {
            let rows: Vec<StockRow> = stocks.iter().map(StockRow::from).collect();
            println!("{}", render(&rows));
            let total: f64 = stocks.iter().map(Stock::current_value).sum();
            summary_row("Total value", &money(total));
        }
    }
    emit_success(mode, "stocks", serde_json::to_value(&stocks)?)
}

pub fn run_add_stock(ctx: &Context, stock: Stock, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let id = store.insert_stock(&stock)?;

    if mode.is_human() {
        success(&format!("Added {} ({}) as #{}", stock.name, stock.ticker, id));
    }
    emit_success(mode, "add-stock", serde_json::json!({ "id": id }))
}

pub fn run_set_price(ctx: &Context, id: i64, price: f64, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stock = require_stock(&store, id)?.with_price(price);
    store.update_stock(&stock)?;

    if mode.is_human() {
        success(&format!("{} now at {}", stock.ticker, money(price)));
        summary_row("Value", &money(stock.current_value()));
    }
    emit_success(mode, "set-price", serde_json::to_value(&stock)?)
}

pub fn run_delete_stock(ctx: &Context, id: i64, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let deleted = store.delete_stock(id)?;

    if mode.is_human() {
        if deleted == 0 {
            ui::warn(&format!("No stock with id {}", id));
        } else {
            success(&format!("{} Deleted stock #{}", Icons::DEL, id));
        }
    }
    emit_success(mode, "delete-stock", serde_json::json!({ "deleted": deleted }))
}

pub struct RecordArgs {
    pub stock_id: i64,
    pub kind: String,
    pub price: f64,
    pub quantity: i64,
    pub amount: Option<f64>,
    pub new_v: Option<f64>,
    pub date: Option<String>,
}

pub fn run_record(ctx: &Context, args: RecordArgs, mode: OutputMode) -> anyhow::Result<()> {
    let kind: TransactionKind = args.kind.parse()?;
    let date = match args.date.as_deref() {
        Some(d) => parse_date_millis(d)?,
        None => chrono::Utc::now().timestamp_millis(),
    };
    let amount = args.amount.unwrap_or(args.price * args.quantity as f64);

    if args.new_v.is_some() && kind != TransactionKind::RecalcV {
        anyhow::bail!("--new-v only applies to {}", TransactionKind::RecalcV);
    }
    let mut tx = TransactionHistory::new(args.stock_id, date, kind.as_str(), args.price, args.quantity, amount);
    tx.new_v = args.new_v;

    let store = ctx.open_store()?;
    let (tx, stock) = store.record_transaction(&tx)?;

    if mode.is_human() {
        success(&format!("Recorded {} #{} for {}", kind, tx.id, stock.ticker));
        summary_row("Amount", &money(amount));
        summary_row("Pool", &money(stock.pool));
        summary_row("Quantity", &stock.quantity.to_string());
        if let (Some(from), Some(to)) = (tx.previous_v, tx.new_v) {
            summary_row("V", &format!("{} -> {}", money(from), money(to)));
        }
    }
    emit_success(
        mode,
        "record",
        serde_json::json!({ "id": tx.id, "transaction": tx, "stock": stock }),
    )
}

pub fn run_history(ctx: &Context, stock_id: i64, snapshots: bool, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;

    if snapshots {
        let history = store.stock_history(stock_id)?;
        if mode.is_human() {
            section(&format!(" {} Snapshots of #{} ", Icons::CALENDAR, stock_id));
            for snap in &history {
                println!(
                    "  {}  V {}  price {}  qty {}  pool {}",
                    ui::dim(&format_millis(snap.timestamp)),
                    money(snap.v_value),
                    money(snap.current_price),
                    snap.quantity,
                    money(snap.pool)
                );
            }
        }
        return emit_success(mode, "history", serde_json::to_value(&history)?);
    }

    let transactions = store.transactions_for_stock(stock_id)?;
    if mode.is_human() {
        section(&format!(" {} Ledger of #{} ", Icons::LEDGER, stock_id));
        if transactions.is_empty() {
            println!("  {}", ui::muted("no transactions"));
        } else {
            let rows: Vec<TransactionRow> = transactions
                .iter()
                .map(|t| TransactionRow::new(t, format_millis(t.date)))
                .collect();
            println!("{}", render(&rows));
        }
    }
    emit_success(mode, "history", serde_json::to_value(&transactions)?)
}

pub fn run_daily(ctx: &Context, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let history = store.daily_history()?;

    if mode.is_human() {
        if history.is_empty() {
            ui::info("Daily history", "empty, record one with `vrstore snapshot`");
        } else {
            let rows: Vec<DailyRow> = history.iter().map(DailyRow::from).collect();
            println!("{}", render(&rows));
            if let Some(last) = history.last() {
                summary_row("Latest return", &percent(last.return_rate()));
            }
        }
    }
    emit_success(mode, "daily", serde_json::to_value(&history)?)
}

pub fn run_snapshot(ctx: &Context, date: Option<String>, mode: OutputMode) -> anyhow::Result<()> {
    let date = match date {
        Some(d) => {
            parse_date_millis(&d)?;
            d
        }
        None => today(),
    };

    let store = ctx.open_store()?;
    let stocks = store.all_stocks_snapshot()?;
    let daily = DailyAssetHistory::from_stocks(date.clone(), &stocks);
    let now = chrono::Utc::now().timestamp_millis();
    let snapshots: Vec<StockHistory> = stocks.iter().map(|s| StockHistory::capture(s, now)).collect();

    store.record_snapshot(&daily, &snapshots)?;

    if mode.is_human() {
        success(&format!("{} Snapshot for {}", Icons::MONEY, date));
        summary_row("Principal", &money(daily.total_principal));
        summary_row("Value", &money(daily.total_current_value));
        summary_row("Return", &percent(daily.return_rate()));
    }
    emit_success(
        mode,
        "snapshot",
        serde_json::json!({ "daily": daily, "stocks": snapshots.len() }),
    )
}

pub fn run_export(ctx: &Context, output: &Path, mode: OutputMode) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let backup = store.export_backup()?;
    backup.write_to(output)?;

    if mode.is_human() {
        success(&format!("{} Exported {} rows to {}", Icons::SAVE, backup.row_count(), output.display()));
    }
    emit_success(
        mode,
        "export",
        serde_json::json!({ "path": output, "rows": backup.row_count() }),
    )
}

pub fn run_import(ctx: &Context, input: &Path, mode: OutputMode) -> anyhow::Result<()> {
    let backup = Backup::read_from(input)?;
    let store = ctx.open_store()?;
    store.restore_backup(&backup)?;

    if mode.is_human() {
        success(&format!("Restored {} rows from {}", backup.row_count(), input.display()));
        summary_row("Backup taken", &format_millis(backup.timestamp));
    }
    emit_success(mode, "import", serde_json::json!({ "rows": backup.row_count() }))
}

pub fn run_reset(ctx: &Context, schema: bool, yes: bool, mode: OutputMode) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("reset deletes every row; pass --yes to confirm");
    }
    let store = ctx.open_store()?;
    if schema {
        store.reset_schema()?;
    } else {
        store.clear_all_tables()?;
    }

    if mode.is_human() {
        success(if schema { "Schema recreated" } else { "All tables cleared" });
    }
    emit_success(mode, "reset", serde_json::json!({ "schema": schema }))
}
