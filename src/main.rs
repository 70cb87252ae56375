//! vrstore CLI - Command-line front end for the value-rebalancing portfolio store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vrstore::config::{self, StoreConfig};
use vrstore::Store;

#[derive(Parser)]
#[command(name = "vrstore")]
#[command(version)]
#[command(about = "Portfolio store for value-rebalancing (VR) stock tracking")]
#[command(long_about = r#"
vrstore keeps the state of a value-rebalancing portfolio in a local SQLite file:
  • Holdings with their V (target value), G (gradient) and cash pool
  • A ledger of buys, sells, deposits, withdrawals and V recalculations
  • Daily totals and per-stock snapshots for charting

Example usage:
  vrstore init
  vrstore add-stock --name Samsung --ticker 005930 --v 1000000 --g 10 --pool 200000 --quantity 12
  vrstore record 1 buy --price 71500 --quantity 2
  vrstore snapshot
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (defaults to ./vrstore.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show schema version and row counts
    Status,

    /// List all stocks
    Stocks,

    /// Add a stock
    AddStock {
        #[arg(long)]
        name: String,

        #[arg(long)]
        ticker: String,

        /// Target value V
        #[arg(long)]
        v: f64,

        /// Gradient G, in percent
        #[arg(long)]
        g: f64,

        /// Cash pool reserved for the stock
        #[arg(long, default_value = "0")]
        pool: f64,

        #[arg(long, default_value = "0")]
        quantity: i64,

        /// Principal invested so far
        #[arg(long, default_value = "0")]
        principal: f64,

        /// Current price
        #[arg(long, default_value = "0")]
        price: f64,

        #[arg(long, default_value = "KRW")]
        currency: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Default amount added to V on recalculation
        #[arg(long, default_value = "0")]
        recalc_amount: f64,
    },

    /// Update the current price of a stock
    SetPrice {
        id: i64,
        price: f64,
    },

    /// Delete a stock (its ledger and snapshots are kept)
    DeleteStock {
        id: i64,
    },

    /// Record a transaction against a stock
    Record {
        stock_id: i64,

        /// BUY, SELL, RECALC_V, DEPOSIT or WITHDRAW
        kind: String,

        #[arg(long, default_value = "0")]
        price: f64,

        #[arg(long, default_value = "0")]
        quantity: i64,

        /// Total amount (defaults to price × quantity)
        #[arg(long)]
        amount: Option<f64>,

        /// New V for RECALC_V; the stock is updated to it
        #[arg(long)]
        new_v: Option<f64>,

        /// Transaction date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the ledger of a stock, newest first
    History {
        stock_id: i64,

        /// Show per-stock snapshots instead of transactions
        #[arg(long)]
        snapshots: bool,
    },

    /// Show daily portfolio totals, oldest first
    Daily,

    /// Record today's totals and a snapshot of every stock
    Snapshot {
        /// Day to record (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Write a JSON backup of every table
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Replace all data with a JSON backup
    Import {
        /// Backup file
        input: PathBuf,
    },

    /// Delete all data
    Reset {
        /// Drop and recreate the tables instead of deleting rows
        #[arg(long)]
        schema: bool,

        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        matches!(self, OutputMode::Human)
    }
}

/// Print a `{ "ok": true, "command", "data" }` envelope
pub fn emit_success(mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if mode.is_human() {
        return Ok(());
    }
    let envelope = serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn emit_error(mode: OutputMode, err: &anyhow::Error) {
    if mode.is_human() {
        vrstore::ui::error(&format!("{:#}", err));
        return;
    }
    let envelope = serde_json::json!({
        "ok": false,
        "error": format!("{:#}", err),
    });
    println!("{}", envelope);
}

/// Resolved store settings for this invocation
pub struct Context {
    pub config_path: PathBuf,
    pub config: StoreConfig,
    pub database: PathBuf,
}

impl Context {
    fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
        let mut config = config::load_config(Some(&config_path))?.unwrap_or_default();
        if let Some(db) = &cli.database {
            config.database = Some(db.to_string_lossy().to_string());
        }
        let base = std::env::current_dir()?;
        let database = config.database_path_in(&base);
        Ok(Self {
            config_path,
            config,
            database,
        })
    }

    pub fn open_store(&self) -> anyhow::Result<Store> {
        config::ensure_db_dir(&self.database)?;
        let store = vrstore::StoreBuilder::new(&self.database)
            .config(self.config.clone())
            .open()?;
        Ok(store)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    if let Err(err) = run(cli, mode) {
        emit_error(mode, &err);
        std::process::exit(1);
    }
}

fn run(cli: Cli, mode: OutputMode) -> anyhow::Result<()> {
    let ctx = Context::resolve(&cli)?;
    tracing::debug!("Using database {}", ctx.database.display());

    match cli.command {
        Commands::Init { force } => commands::run_init(&ctx, force, mode),
        Commands::Status => commands::run_status(&ctx, mode),
        Commands::Stocks => commands::run_stocks(&ctx, mode),
        Commands::AddStock {
            name,
            ticker,
            v,
            g,
            pool,
            quantity,
            principal,
            price,
            currency,
            start_date,
            recalc_amount,
        } => {
            let start_date = start_date.as_deref().map(commands::parse_date_millis).transpose()?;
            let stock = vrstore::Stock::new(name, ticker, v, g, pool, quantity)
                .with_principal(principal)
                .with_price(price)
                .with_currency(currency)
                .with_start_date(start_date.unwrap_or(0))
                .with_default_recalc_amount(recalc_amount);
            commands::run_add_stock(&ctx, stock, mode)
        }
        Commands::SetPrice { id, price } => commands::run_set_price(&ctx, id, price, mode),
        Commands::DeleteStock { id } => commands::run_delete_stock(&ctx, id, mode),
        Commands::Record {
            stock_id,
            kind,
            price,
            quantity,
            amount,
            new_v,
            date,
        } => commands::run_record(
            &ctx,
            commands::RecordArgs {
                stock_id,
                kind,
                price,
                quantity,
                amount,
                new_v,
                date,
            },
            mode,
        ),
        Commands::History { stock_id, snapshots } => commands::run_history(&ctx, stock_id, snapshots, mode),
        Commands::Daily => commands::run_daily(&ctx, mode),
        Commands::Snapshot { date } => commands::run_snapshot(&ctx, date, mode),
        Commands::Export { output } => commands::run_export(&ctx, &output, mode),
        Commands::Import { input } => commands::run_import(&ctx, &input, mode),
        Commands::Reset { schema, yes } => commands::run_reset(&ctx, schema, yes, mode),
    }
}
