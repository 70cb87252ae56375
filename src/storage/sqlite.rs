//! SQLite storage implementation

use super::entity::{self, Entity};
use super::guard;
use super::lifecycle::{self, OpenOutcome, StoreCallback};
use super::migration::MigrationChain;
use super::schema::{self, SCHEMA_VERSION, Table};
use crate::backup::Backup;
use crate::config::{JournalMode, StoreConfig};
use crate::history::{DailyAssetHistory, StockHistory};
use crate::stock::Stock;
use crate::transaction::{TransactionHistory, TransactionKind};
use crate::watcher::{InvalidationTracker, LiveQuery};
use crate::{Error, Result};
use rusqlite::{Connection, InterruptHandle, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const TRANSACTIONS_FOR_STOCK: &str = "WHERE stockId = ?1 ORDER BY date DESC, id DESC";
const DAILY_HISTORY_ORDER: &str = "ORDER BY date ASC";
const STOCK_HISTORY_FOR_STOCK: &str = "WHERE stockId = ?1 ORDER BY timestamp ASC, id ASC";

/// Configures and opens a `Store`
pub struct StoreBuilder {
    path: Option<PathBuf>,
    config: StoreConfig,
    migrations: MigrationChain,
    callbacks: Vec<Arc<dyn StoreCallback>>,
}

impl StoreBuilder {
    /// A file-backed store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: StoreConfig::default(),
            migrations: MigrationChain::default(),
            callbacks: Vec::new(),
        }
    }

    /// An in-memory store (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            config: StoreConfig::default(),
            migrations: MigrationChain::default(),
            callbacks: Vec::new(),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.config.journal_mode = mode;
        self
    }

    pub fn allow_restricted_thread_queries(mut self, allow: bool) -> Self {
        self.config.allow_restricted_thread_queries = allow;
        self
    }

    pub fn destructive_fallback(mut self, enabled: bool) -> Self {
        self.config.destructive_fallback = enabled;
        self
    }

    pub fn migrations(mut self, chain: MigrationChain) -> Self {
        self.migrations = chain;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn StoreCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn open(self) -> Result<Store> {
        let mut conn = match &self.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    self.config.journal_mode.as_str(),
                    |row| row.get(0),
                )?;
                tracing::debug!("Opened {} in {} journal mode", path.display(), mode);
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        let interrupt = Arc::new(conn.get_interrupt_handle());

        let outcome = lifecycle::initialize(
            &mut conn,
            &self.migrations,
            &self.callbacks,
            self.config.destructive_fallback,
        )?;
        tracing::info!(
            "Store ready at version {} ({:?})",
            SCHEMA_VERSION,
            outcome
        );

        Ok(Store {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                interrupt,
                tracker: Arc::new(InvalidationTracker::new()),
                callbacks: self.callbacks,
                allow_restricted: self.config.allow_restricted_thread_queries,
                path: self.path,
                outcome,
            }),
        })
    }
}

struct Inner {
    conn: Mutex<Connection>,
    interrupt: Arc<InterruptHandle>,
    tracker: Arc<InvalidationTracker>,
    callbacks: Vec<Arc<dyn StoreCallback>>,
    allow_restricted: bool,
    path: Option<PathBuf>,
    outcome: OpenOutcome,
}

/// Handle to the portfolio store.
///
/// Clones share one connection; the engine serializes writers and every
/// read observes the last committed state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        StoreBuilder::new(path).open()
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        StoreBuilder::in_memory().open()
    }

    /// Open the database named by `config`, relative to `base` when unset
    pub fn open_with_config(config: &StoreConfig, base: &Path) -> Result<Self> {
        StoreBuilder::new(config.database_path_in(base))
            .config(config.clone())
            .open()
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// How the open sequence brought the schema up to date
    pub fn open_outcome(&self) -> OpenOutcome {
        self.inner.outcome
    }

    /// Handle that aborts whatever statement is running on the store's connection.
    ///
    /// Taken at open time, so it is available while another thread holds the connection.
    pub fn interrupt_handle(&self) -> Arc<InterruptHandle> {
        Arc::clone(&self.inner.interrupt)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Run `f` in an exclusive transaction, then notify live queries on `tables`.
    ///
    /// Any error rolls the whole transaction back.
    fn write<R>(
        &self,
        operation: &'static str,
        tables: &[Table],
        f: impl FnOnce(&Transaction<'_>) -> Result<R>,
    ) -> Result<R> {
        guard::ensure_unrestricted(operation, self.inner.allow_restricted)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        let out = f(&tx)?;
        tx.commit()?;
        self.inner.tracker.notify(&conn, tables);
        Ok(out)
    }

    fn read<R>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<R>) -> Result<R> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    /// Subscribe `query` to changes on `tables`; the current result is delivered first
    fn observe<T, F>(&self, tables: &[Table], query: F) -> Result<LiveQuery<T>>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> rusqlite::Result<Vec<T>> + Send + Sync + 'static,
    {
        let conn = self.lock()?;
        let (sender, receiver) = crossbeam::channel::unbounded();
        let initial = query(&conn)?;
        let _ = sender.send(initial);
        let id = self.inner.tracker.register(tables, query, sender);
        drop(conn);
        Ok(LiveQuery::new(id, receiver, Arc::clone(&self.inner.tracker)))
    }

    // ========== Stock Operations ==========

    /// Insert a stock; a zero id is auto-assigned. Returns the row id.
    pub fn insert_stock(&self, stock: &Stock) -> Result<i64> {
        let ids = self.insert_stocks(std::slice::from_ref(stock))?;
        Ok(ids[0])
    }

    /// Insert a batch of stocks; all or nothing
    pub fn insert_stocks(&self, stocks: &[Stock]) -> Result<Vec<i64>> {
        self.write("insert_stocks", &[Table::Stocks], |tx| {
            Ok(entity::insert_all(tx, stocks)?)
        })
    }

    /// Rewrite every column of the stock with `stock.id`.
    ///
    /// Returns the number of rows affected; 0 means no such stock.
    pub fn update_stock(&self, stock: &Stock) -> Result<usize> {
        self.write("update_stock", &[Table::Stocks], |tx| {
            Ok(entity::update(tx, stock)?)
        })
    }

    /// Delete one stock. Its transactions and snapshots are left in place.
    pub fn delete_stock(&self, id: i64) -> Result<usize> {
        self.write("delete_stock", &[Table::Stocks], |tx| {
            Ok(tx.execute("DELETE FROM stocks WHERE id = ?1", params![id])?)
        })
    }

    pub fn delete_all_stocks(&self) -> Result<usize> {
        self.write("delete_all_stocks", &[Table::Stocks], |tx| {
            Ok(entity::delete_all::<Stock>(tx)?)
        })
    }

    /// Get a stock by id
    pub fn get_stock(&self, id: i64) -> Result<Option<Stock>> {
        self.read(|conn| entity::query_one(conn, "WHERE id = ?1", params![id]))
    }

    /// All stocks, in no particular order
    pub fn all_stocks_snapshot(&self) -> Result<Vec<Stock>> {
        self.read(|conn| entity::query_all(conn, "", []))
    }

    /// Live list of all stocks
    pub fn observe_stocks(&self) -> Result<LiveQuery<Stock>> {
        self.observe(&[Table::Stocks], |conn| entity::query_all(conn, "", []))
    }

    // ========== Transaction Operations ==========

    pub fn insert_transaction(&self, transaction: &TransactionHistory) -> Result<i64> {
        let ids = self.insert_transactions(std::slice::from_ref(transaction))?;
        Ok(ids[0])
    }

    pub fn insert_transactions(&self, transactions: &[TransactionHistory]) -> Result<Vec<i64>> {
        self.write("insert_transactions", &[Table::Transactions], |tx| {
            Ok(entity::insert_all(tx, transactions)?)
        })
    }

    pub fn delete_all_transactions(&self) -> Result<usize> {
        self.write("delete_all_transactions", &[Table::Transactions], |tx| {
            Ok(entity::delete_all::<TransactionHistory>(tx)?)
        })
    }

    /// Transactions of one stock, newest first
    pub fn transactions_for_stock(&self, stock_id: i64) -> Result<Vec<TransactionHistory>> {
        self.read(|conn| entity::query_all(conn, TRANSACTIONS_FOR_STOCK, params![stock_id]))
    }

    pub fn all_transactions_snapshot(&self) -> Result<Vec<TransactionHistory>> {
        self.read(|conn| entity::query_all(conn, "", []))
    }

    /// Live transactions of one stock, newest first
    pub fn observe_transactions(&self, stock_id: i64) -> Result<LiveQuery<TransactionHistory>> {
        self.observe(&[Table::Transactions], move |conn| {
            entity::query_all(conn, TRANSACTIONS_FOR_STOCK, params![stock_id])
        })
    }

    /// Record `transaction` and fold it into its stock in one transaction.
    ///
    /// A `RECALC_V` carrying a new V gets the stock's current V as its
    /// previous value. Returns the stored transaction (with its id) and the
    /// updated stock; a missing stock or failed insert leaves both tables as
    /// they were.
    pub fn record_transaction(&self, transaction: &TransactionHistory) -> Result<(TransactionHistory, Stock)> {
        self.write("record_transaction", &[Table::Stocks, Table::Transactions], |tx| {
            let mut stock: Stock = entity::query_one(tx, "WHERE id = ?1", params![transaction.stock_id])?
                .ok_or_else(|| Error::InvalidValue(format!("no stock with id {}", transaction.stock_id)))?;

            let mut recorded = transaction.clone();
            if recorded.known_kind() == Some(TransactionKind::RecalcV) {
                if let Some(new_v) = recorded.new_v {
                    recorded = recorded.with_v_change(stock.v_value, new_v);
                }
            }

            stock.apply(&recorded);
            entity::update(tx, &stock)?;
            let ids = entity::insert_all(tx, std::slice::from_ref(&recorded))?;
            recorded.id = ids[0];
            Ok((recorded, stock))
        })
    }

    // ========== Daily Asset History Operations ==========

    /// Insert or replace the snapshot for `history.date`
    pub fn insert_daily_history(&self, history: &DailyAssetHistory) -> Result<()> {
        self.insert_daily_histories(std::slice::from_ref(history))
    }

    pub fn insert_daily_histories(&self, histories: &[DailyAssetHistory]) -> Result<()> {
        self.write("insert_daily_histories", &[Table::DailyAssetHistory], |tx| {
            entity::insert_all(tx, histories)?;
            Ok(())
        })
    }

    pub fn delete_all_daily_history(&self) -> Result<usize> {
        self.write("delete_all_daily_history", &[Table::DailyAssetHistory], |tx| {
            Ok(entity::delete_all::<DailyAssetHistory>(tx)?)
        })
    }

    /// Daily snapshots, oldest first
    pub fn daily_history(&self) -> Result<Vec<DailyAssetHistory>> {
        self.read(|conn| entity::query_all(conn, DAILY_HISTORY_ORDER, []))
    }

    pub fn all_daily_history_snapshot(&self) -> Result<Vec<DailyAssetHistory>> {
        self.read(|conn| entity::query_all(conn, "", []))
    }

    /// Live daily snapshots, oldest first
    pub fn observe_daily_history(&self) -> Result<LiveQuery<DailyAssetHistory>> {
        self.observe(&[Table::DailyAssetHistory], |conn| {
            entity::query_all(conn, DAILY_HISTORY_ORDER, [])
        })
    }

    // ========== Stock History Operations ==========

    pub fn insert_stock_history(&self, history: &StockHistory) -> Result<i64> {
        let ids = self.insert_stock_histories(std::slice::from_ref(history))?;
        Ok(ids[0])
    }

    pub fn insert_stock_histories(&self, histories: &[StockHistory]) -> Result<Vec<i64>> {
        self.write("insert_stock_histories", &[Table::StockHistory], |tx| {
            Ok(entity::insert_all(tx, histories)?)
        })
    }

    pub fn delete_all_stock_history(&self) -> Result<usize> {
        self.write("delete_all_stock_history", &[Table::StockHistory], |tx| {
            Ok(entity::delete_all::<StockHistory>(tx)?)
        })
    }

    /// Snapshots of one stock, oldest first
    pub fn stock_history(&self, stock_id: i64) -> Result<Vec<StockHistory>> {
        self.read(|conn| entity::query_all(conn, STOCK_HISTORY_FOR_STOCK, params![stock_id]))
    }

    pub fn all_stock_history_snapshot(&self) -> Result<Vec<StockHistory>> {
        self.read(|conn| entity::query_all(conn, "", []))
    }

    /// Live snapshots of one stock, oldest first
    pub fn observe_stock_history(&self, stock_id: i64) -> Result<LiveQuery<StockHistory>> {
        self.observe(&[Table::StockHistory], move |conn| {
            entity::query_all(conn, STOCK_HISTORY_FOR_STOCK, params![stock_id])
        })
    }

    /// Store the day's totals and the per-stock snapshots behind them, all or nothing
    pub fn record_snapshot(&self, daily: &DailyAssetHistory, stocks: &[StockHistory]) -> Result<Vec<i64>> {
        self.write(
            "record_snapshot",
            &[Table::DailyAssetHistory, Table::StockHistory],
            |tx| {
                entity::insert_all(tx, std::slice::from_ref(daily))?;
                Ok(entity::insert_all(tx, stocks)?)
            },
        )
    }

    // ========== Bulk Operations ==========

    /// Delete every row of every table, then vacuum and truncate the WAL so
    /// the freed pages are returned to the file system.
    pub fn clear_all_tables(&self) -> Result<()> {
        self.clear_all_tables_with(compact)
    }

    /// Live queries hear about the deletion as soon as it commits; a failed
    /// compaction is reported but never hides the commit from them.
    fn clear_all_tables_with(&self, compact: impl FnOnce(&Connection) -> rusqlite::Result<()>) -> Result<()> {
        guard::ensure_unrestricted("clear_all_tables", self.inner.allow_restricted)?;
        let mut conn = self.lock()?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        entity::delete_all::<Stock>(&tx)?;
        entity::delete_all::<TransactionHistory>(&tx)?;
        entity::delete_all::<DailyAssetHistory>(&tx)?;
        entity::delete_all::<StockHistory>(&tx)?;
        tx.commit()?;
        tracing::info!("Cleared all tables");
        self.inner.tracker.notify(&conn, Table::all());

        if let Err(e) = compact(&conn) {
            tracing::warn!("Compaction after clear failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop every table and recreate the schema empty.
    ///
    /// Registered callbacks see `on_table_dropped` for each table before it goes.
    pub fn reset_schema(&self) -> Result<()> {
        guard::ensure_unrestricted("reset_schema", self.inner.allow_restricted)?;
        let mut conn = self.lock()?;
        lifecycle::recreate(&mut conn, &self.inner.callbacks)?;
        tracing::warn!("Schema dropped and recreated");
        self.inner.tracker.notify(&conn, Table::all());
        Ok(())
    }

    /// Full-table snapshots of every table, stamped with the current time
    pub fn export_backup(&self) -> Result<Backup> {
        self.export_backup_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn export_backup_at(&self, timestamp: i64) -> Result<Backup> {
        let conn = self.lock()?;
        Ok(Backup {
            version: Backup::FORMAT_VERSION,
            timestamp,
            stocks: entity::query_all(&conn, "", [])?,
            transactions: entity::query_all(&conn, "", [])?,
            daily_history: entity::query_all(&conn, "", [])?,
            stock_history: entity::query_all(&conn, "", [])?,
        })
    }

    /// Replace all rows with the backup's, keeping its ids; all or nothing
    pub fn restore_backup(&self, backup: &Backup) -> Result<()> {
        backup.check_version()?;
        self.write("restore_backup", Table::all(), |tx| {
            entity::delete_all::<Stock>(tx)?;
            entity::delete_all::<TransactionHistory>(tx)?;
            entity::delete_all::<DailyAssetHistory>(tx)?;
            entity::delete_all::<StockHistory>(tx)?;

            entity::insert_all(tx, &backup.stocks)?;
            entity::insert_all(tx, &backup.transactions)?;
            entity::insert_all(tx, &backup.daily_history)?;
            entity::insert_all(tx, &backup.stock_history)?;
            Ok(())
        })?;
        tracing::info!("Restored backup with {} rows", backup.row_count());
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        Ok(StoreStats {
            schema_version: lifecycle::user_version(&conn)?,
            identity_hash: schema::read_identity(&conn)?.unwrap_or_default(),
            stocks: entity::count::<Stock>(&conn)?,
            transactions: entity::count::<TransactionHistory>(&conn)?,
            daily_history: entity::count::<DailyAssetHistory>(&conn)?,
            stock_history: entity::count::<StockHistory>(&conn)?,
        })
    }

    /// Number of live queries currently registered
    pub fn live_query_count(&self) -> usize {
        self.inner.tracker.observer_count()
    }
}

/// Rebuild the file without free pages, then fold the WAL back into it and
/// truncate it. Outside WAL mode the checkpoint is a no-op.
fn compact(conn: &Connection) -> rusqlite::Result<()> {
    if conn.is_autocommit() {
        conn.execute_batch("VACUUM;")?;
    }
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub schema_version: u32,
    pub identity_hash: String,
    pub stocks: usize,
    pub transactions: usize,
    pub daily_history: usize,
    pub stock_history: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Statistics:")?;
        writeln!(f, "  Schema version: {}", self.schema_version)?;
        writeln!(f, "  Stocks: {}", self.stocks)?;
        writeln!(f, "  Transactions: {}", self.transactions)?;
        writeln!(f, "  Daily history: {}", self.daily_history)?;
        write!(f, "  Stock history: {}", self.stock_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migration::create_v4_schema;

    const WAIT: Duration = Duration::from_millis(200);

    fn sample_stock(name: &str) -> Stock {
        Stock::new(name, name.to_uppercase(), 1_000_000.0, 10.0, 250_000.0, 12)
            .with_principal(1_200_000.0)
            .with_price(71_500.0)
            .with_start_date(1_700_000_000_000)
            .with_default_recalc_amount(50_000.0)
    }

    #[test]
    fn test_stock_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let stock = sample_stock("samsung");

        let id = store.insert_stock(&stock).unwrap();
        assert!(id > 0);

        let retrieved = store.get_stock(id).unwrap().unwrap();
        assert_eq!(retrieved, Stock { id, ..stock });
    }

    #[test]
    fn test_explicit_id_is_kept() {
        let store = Store::open_in_memory().unwrap();
        let stock = Stock { id: 77, ..sample_stock("kept") };
        assert_eq!(store.insert_stock(&stock).unwrap(), 77);
        assert_eq!(store.get_stock(77).unwrap().unwrap(), stock);
    }

    #[test]
    fn test_missing_stock_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_stock(404).unwrap().is_none());
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_id_aborts_whole_batch() {
        let store = Store::open_in_memory().unwrap();
        let a = Stock { id: 1, ..sample_stock("a") };
        let b = Stock { id: 2, ..sample_stock("b") };
        let dup = Stock { id: 1, ..sample_stock("dup") };

        let err = store.insert_stocks(&[a, b, dup]).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_update_stock() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("lg")).unwrap();

        let mut stock = store.get_stock(id).unwrap().unwrap();
        stock.current_price = 80_000.0;
        stock.quantity = 15;
        assert_eq!(store.update_stock(&stock).unwrap(), 1);
        assert_eq!(store.get_stock(id).unwrap().unwrap(), stock);

        let ghost = Stock { id: 999, ..stock };
        assert_eq!(store.update_stock(&ghost).unwrap(), 0);
    }

    #[test]
    fn test_delete_stock_leaves_orphans() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("orphan")).unwrap();
        let stock = store.get_stock(id).unwrap().unwrap();

        store
            .insert_transaction(&TransactionHistory::new(id, 1, "BUY", 100.0, 1, 100.0))
            .unwrap();
        store.insert_stock_history(&StockHistory::capture(&stock, 1)).unwrap();

        assert_eq!(store.delete_stock(id).unwrap(), 1);
        assert!(store.get_stock(id).unwrap().is_none());
        assert_eq!(store.transactions_for_stock(id).unwrap().len(), 1);
        assert_eq!(store.stock_history(id).unwrap().len(), 1);
    }

    #[test]
    fn test_transactions_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_transactions(&[
                TransactionHistory::new(1, 100, "BUY", 10.0, 1, 10.0),
                TransactionHistory::new(1, 300, "SELL", 12.0, 1, 12.0),
                TransactionHistory::new(2, 500, "BUY", 9.0, 1, 9.0),
                TransactionHistory::new(1, 200, "RECALC_V", 0.0, 0, 0.0).with_v_change(100.0, 110.0),
            ])
            .unwrap();

        let dates: Vec<i64> = store
            .transactions_for_stock(1)
            .unwrap()
            .iter()
            .map(|t| t.date)
            .collect();
        assert_eq!(dates, vec![300, 200, 100]);

        let recalc = &store.transactions_for_stock(1).unwrap()[1];
        assert_eq!(recalc.previous_v, Some(100.0));
        assert_eq!(recalc.new_v, Some(110.0));
    }

    #[test]
    fn test_daily_history_upsert() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_daily_history(&DailyAssetHistory::new("2024-05-02", 100.0, 110.0))
            .unwrap();
        store
            .insert_daily_history(&DailyAssetHistory::new("2024-05-01", 100.0, 90.0))
            .unwrap();
        store
            .insert_daily_history(&DailyAssetHistory::new("2024-05-02", 100.0, 120.0))
            .unwrap();

        let history = store.daily_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, "2024-05-01");
        assert_eq!(history[1].total_current_value, 120.0);
    }

    #[test]
    fn test_stock_history_oldest_first() {
        let store = Store::open_in_memory().unwrap();
        let stock = Stock { id: 3, ..sample_stock("snap") };
        store
            .insert_stock_histories(&[
                StockHistory::capture(&stock, 30),
                StockHistory::capture(&stock, 10),
                StockHistory::capture(&Stock { id: 4, ..stock.clone() }, 20),
            ])
            .unwrap();

        let stamps: Vec<i64> = store.stock_history(3).unwrap().iter().map(|h| h.timestamp).collect();
        assert_eq!(stamps, vec![10, 30]);
    }

    #[test]
    fn test_live_transactions_follow_commits() {
        let store = Store::open_in_memory().unwrap();
        let live = store.observe_transactions(1).unwrap();
        assert_eq!(live.recv_timeout(WAIT), Some(vec![]));

        store
            .insert_transaction(&TransactionHistory::new(1, 100, "BUY", 10.0, 1, 10.0))
            .unwrap();
        store
            .insert_transaction(&TransactionHistory::new(1, 200, "BUY", 11.0, 1, 11.0))
            .unwrap();

        let first = live.recv_timeout(WAIT).unwrap();
        assert_eq!(first.len(), 1);
        let second = live.recv_timeout(WAIT).unwrap();
        let dates: Vec<i64> = second.iter().map(|t| t.date).collect();
        assert_eq!(dates, vec![200, 100]);

        store
            .insert_daily_history(&DailyAssetHistory::new("2024-01-01", 1.0, 1.0))
            .unwrap();
        store.insert_stock(&sample_stock("unrelated")).unwrap();
        assert!(live.try_recv().is_none());

        live.cancel();
        assert_eq!(store.live_query_count(), 0);
    }

    #[test]
    fn test_live_queries_from_other_thread() {
        let store = Store::open_in_memory().unwrap();
        let live = store.observe_stocks().unwrap();
        assert_eq!(live.recv_timeout(WAIT), Some(vec![]));

        let writer = store.clone();
        std::thread::spawn(move || {
            for name in ["a", "b", "c"] {
                writer.insert_stock(&sample_stock(name)).unwrap();
            }
        })
        .join()
        .unwrap();

        let sizes: Vec<usize> = (0..3).map(|_| live.recv_timeout(WAIT).unwrap().len()).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        live.cancel();
    }

    #[test]
    fn test_live_daily_history_sorted() {
        let store = Store::open_in_memory().unwrap();
        let live = store.observe_daily_history().unwrap();
        live.recv_timeout(WAIT).unwrap();

        store
            .insert_daily_histories(&[
                DailyAssetHistory::new("2024-02-02", 1.0, 1.0),
                DailyAssetHistory::new("2024-02-01", 1.0, 1.0),
            ])
            .unwrap();
        let dates: Vec<String> = live.recv_timeout(WAIT).unwrap().into_iter().map(|d| d.date).collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-02-02"]);
        live.cancel();
    }

    #[test]
    fn test_restricted_thread_rejects_mutations() {
        let store = Store::open_in_memory().unwrap();
        guard::restrict_current_thread();

        let err = store.insert_stock(&sample_stock("ui")).unwrap_err();
        assert!(matches!(err, Error::RestrictedThread { operation: "insert_stocks" }));
        assert!(matches!(store.clear_all_tables(), Err(Error::RestrictedThread { .. })));

        // reads stay available
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
        guard::release_current_thread();

        let permissive = StoreBuilder::in_memory()
            .allow_restricted_thread_queries(true)
            .open()
            .unwrap();
        guard::restrict_current_thread();
        permissive.insert_stock(&sample_stock("ui")).unwrap();
        guard::release_current_thread();
    }

    #[test]
    fn test_clear_all_tables() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("x")).unwrap();
        store
            .insert_transaction(&TransactionHistory::new(id, 1, "BUY", 1.0, 1, 1.0))
            .unwrap();
        store
            .insert_daily_history(&DailyAssetHistory::new("2024-01-01", 1.0, 1.0))
            .unwrap();
        store
            .insert_stock_history(&StockHistory::capture(&sample_stock("x"), 1))
            .unwrap();
        let live = store.observe_stocks().unwrap();
        live.recv_timeout(WAIT).unwrap();

        store.clear_all_tables().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!((stats.stocks, stats.transactions, stats.daily_history, stats.stock_history), (0, 0, 0, 0));
        assert_eq!(live.recv_timeout(WAIT), Some(vec![]));
        live.cancel();
    }

    #[test]
    fn test_clear_all_tables_compacts_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.db");
        let store = StoreBuilder::new(&path)
            .journal_mode(JournalMode::Delete)
            .open()
            .unwrap();

        let rows: Vec<StockHistory> = (0..5_000)
            .map(|i| StockHistory::capture(&sample_stock("bulk"), i))
            .collect();
        store.insert_stock_histories(&rows).unwrap();
        let before = std::fs::metadata(&path).unwrap().len();

        store.clear_all_tables().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before, "expected {} < {}", after, before);
        assert_eq!(store.stats().unwrap().stock_history, 0);
    }

    fn file_footprint(path: &Path) -> u64 {
        let wal = PathBuf::from(format!("{}-wal", path.display()));
        let size = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
        size(path) + size(&wal)
    }

    #[test]
    fn test_clear_all_tables_shrinks_wal_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let store = StoreBuilder::new(&path)
            .journal_mode(JournalMode::Wal)
            .open()
            .unwrap();

        let rows: Vec<StockHistory> = (0..5_000)
            .map(|i| StockHistory::capture(&sample_stock("bulk"), i))
            .collect();
        store.insert_stock_histories(&rows).unwrap();
        let before = file_footprint(&path);

        store.clear_all_tables().unwrap();
        let after = file_footprint(&path);
        assert!(after <= before, "expected {} <= {}", after, before);

        let wal = PathBuf::from(format!("{}-wal", path.display()));
        assert_eq!(std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0), 0);
        assert_eq!(store.stats().unwrap().stock_history, 0);
    }

    #[test]
    fn test_failed_compaction_still_notifies() {
        let store = Store::open_in_memory().unwrap();
        store.insert_stock(&sample_stock("x")).unwrap();
        let live = store.observe_stocks().unwrap();
        assert_eq!(live.recv_timeout(WAIT).unwrap().len(), 1);

        let err = store
            .clear_all_tables_with(|_| Err(rusqlite::Error::InvalidQuery))
            .unwrap_err();
        assert!(matches!(err, Error::Storage(rusqlite::Error::InvalidQuery)));

        // the deletion committed and was delivered
        assert_eq!(live.recv_timeout(WAIT), Some(vec![]));
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
        live.cancel();
    }

    #[test]
    fn test_record_buy_and_sell_update_stock() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("trade")).unwrap();
        let live = store.observe_transactions(id).unwrap();
        live.recv_timeout(WAIT).unwrap();

        let (buy, stock) = store
            .record_transaction(&TransactionHistory::new(id, 100, "BUY", 70_000.0, 2, 140_000.0))
            .unwrap();
        assert!(buy.id > 0);
        assert_eq!((stock.pool, stock.quantity), (110_000.0, 14));
        assert_eq!(stock.invested_principal, 1_200_000.0);

        let (_, stock) = store
            .record_transaction(&TransactionHistory::new(id, 200, "SELL", 75_000.0, 4, 300_000.0))
            .unwrap();
        assert_eq!((stock.pool, stock.quantity), (410_000.0, 10));
        assert_eq!(store.get_stock(id).unwrap().unwrap(), stock);

        assert_eq!(live.recv_timeout(WAIT).unwrap().len(), 1);
        let ledger = live.recv_timeout(WAIT).unwrap();
        assert_eq!(ledger[0].kind, "SELL");
        assert_eq!(ledger[1], buy);
        live.cancel();
    }

    #[test]
    fn test_record_recalc_sets_v() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("recalc")).unwrap();

        let mut recalc = TransactionHistory::new(id, 100, "RECALC_V", 0.0, 0, 0.0);
        recalc.new_v = Some(1_100_000.0);
        let (recorded, stock) = store.record_transaction(&recalc).unwrap();

        assert_eq!(recorded.previous_v, Some(1_000_000.0));
        assert_eq!(recorded.new_v, Some(1_100_000.0));
        assert_eq!(stock.v_value, 1_100_000.0);
        assert_eq!(stock.pool, 250_000.0);
        assert_eq!(store.transactions_for_stock(id).unwrap(), vec![recorded]);
    }

    #[test]
    fn test_failed_record_rolls_back_stock() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("atomic")).unwrap();
        let original = store.get_stock(id).unwrap().unwrap();

        let first = TransactionHistory { id: 5, ..TransactionHistory::new(id, 1, "BUY", 10.0, 1, 10.0) };
        store.insert_transaction(&first).unwrap();

        // same primary key: the insert fails after the stock was updated
        let clash = TransactionHistory { id: 5, ..TransactionHistory::new(id, 2, "BUY", 10.0, 3, 30.0) };
        assert!(matches!(store.record_transaction(&clash), Err(Error::Storage(_))));
        assert_eq!(store.get_stock(id).unwrap().unwrap(), original);
        assert_eq!(store.transactions_for_stock(id).unwrap().len(), 1);

        let orphan = TransactionHistory::new(404, 3, "BUY", 10.0, 1, 10.0);
        assert!(matches!(store.record_transaction(&orphan), Err(Error::InvalidValue(_))));
        assert_eq!(store.stats().unwrap().transactions, 1);
    }

    #[test]
    fn test_record_snapshot_is_atomic() {
        let store = Store::open_in_memory().unwrap();
        let stock = Stock { id: 1, ..sample_stock("snap") };
        let daily = DailyAssetHistory::from_stocks("2024-07-01", std::slice::from_ref(&stock));

        let ids = store
            .record_snapshot(&daily, &[StockHistory::capture(&stock, 10), StockHistory::capture(&stock, 20)])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.daily_history().unwrap(), vec![daily]);

        let dup = StockHistory { id: 50, ..StockHistory::capture(&stock, 30) };
        let next_day = DailyAssetHistory::from_stocks("2024-07-02", std::slice::from_ref(&stock));
        assert!(store.record_snapshot(&next_day, &[dup.clone(), dup]).is_err());
        assert_eq!(store.daily_history().unwrap().len(), 1);
        assert_eq!(store.stock_history(1).unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vr.db");
        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.open_outcome(), OpenOutcome::Created);
            store.insert_stock(&sample_stock("persist")).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.open_outcome(), OpenOutcome::Verified);
        assert_eq!(store.all_stocks_snapshot().unwrap().len(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_v4_file_migrates_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            create_v4_schema(&conn).unwrap();
            conn.execute(
                "INSERT INTO stocks (name, ticker, vValue, gValue, pool, quantity, investedPrincipal, currentPrice, currency)
                 VALUES ('Kakao', '035720', 500.0, 10.0, 50.0, 2, 480.0, 45.0, 'KRW')",
                [],
            )
            .unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.open_outcome(), OpenOutcome::Migrated { from: 4 });
        assert_eq!(store.stats().unwrap().schema_version, SCHEMA_VERSION);

        let stocks = store.all_stocks_snapshot().unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].ticker, "035720");
        assert_eq!(stocks[0].start_date, 0);
        assert_eq!(stocks[0].default_recalc_amount, 0.0);
    }

    #[test]
    fn test_identity_drift_blocks_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift.db");
        drop(Store::open(&path).unwrap());
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("UPDATE store_master SET identity_hash = 'older-build'", [])
                .unwrap();
        }

        assert!(matches!(Store::open(&path), Err(Error::IdentityMismatch { .. })));
    }

    #[test]
    fn test_backup_roundtrip_through_store() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_stock(&sample_stock("backup")).unwrap();
        store
            .insert_transaction(&TransactionHistory::new(id, 5, "DEPOSIT", 0.0, 0, 1000.0))
            .unwrap();
        store
            .insert_daily_history(&DailyAssetHistory::new("2024-06-01", 10.0, 12.0))
            .unwrap();
        let backup = store.export_backup_at(1_717_200_000_000).unwrap();

        let restored = Store::open_in_memory().unwrap();
        restored.insert_stock(&sample_stock("replaced")).unwrap();
        restored.restore_backup(&backup).unwrap();

        assert_eq!(restored.export_backup_at(1_717_200_000_000).unwrap(), backup);
    }

    #[test]
    fn test_failed_restore_keeps_existing_rows() {
        let store = Store::open_in_memory().unwrap();
        store.insert_stock(&sample_stock("keep")).unwrap();

        let dup = Stock { id: 9, ..sample_stock("dup") };
        let backup = Backup {
            stocks: vec![dup.clone(), dup],
            ..Backup::default()
        };
        assert!(store.restore_backup(&backup).is_err());
        assert_eq!(store.all_stocks_snapshot().unwrap()[0].name, "keep");
    }

    #[test]
    fn test_reset_schema() {
        let store = Store::open_in_memory().unwrap();
        store.insert_stock(&sample_stock("gone")).unwrap();
        store.reset_schema().unwrap();
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
        assert_eq!(store.stats().unwrap().identity_hash, schema::identity_hash());
    }

    #[test]
    fn test_interrupt_stops_running_read() {
        let store = Store::open_in_memory().unwrap();
        let (done_tx, done_rx) = crossbeam::channel::bounded(1);

        let reader = store.clone();
        let worker = std::thread::spawn(move || {
            let result = reader.read(|conn| {
                conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
                    [],
                    |row| row.get::<_, i64>(0),
                )
            });
            let _ = done_tx.send(result);
        });

        // The reader holds the connection lock; the handle must not need it.
        // Interrupts sent before the statement starts are dropped, so keep sending.
        let mut outcome = None;
        for _ in 0..100 {
            store.interrupt_handle().interrupt();
            if let Ok(result) = done_rx.recv_timeout(Duration::from_millis(50)) {
                outcome = Some(result);
                break;
            }
        }
        let outcome = outcome.expect("read was never interrupted");
        worker.join().unwrap();

        match outcome {
            Err(Error::Storage(rusqlite::Error::SqliteFailure(e, _))) => {
                assert_eq!(e.code, rusqlite::ErrorCode::OperationInterrupted);
            }
            other => panic!("expected an interrupted read, got {:?}", other),
        }
        assert!(store.all_stocks_snapshot().unwrap().is_empty());
    }
}
