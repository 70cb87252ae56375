//! Async facade over `Store`
//!
//! Every call moves onto tokio's blocking pool, so awaiting a store operation
//! never blocks a runtime worker.

use super::sqlite::{Store, StoreStats};
use crate::backup::Backup;
use crate::history::{DailyAssetHistory, StockHistory};
use crate::stock::Stock;
use crate::transaction::TransactionHistory;
use crate::watcher::LiveQuery;
use crate::{Error, Result};

#[derive(Clone)]
pub struct AsyncStore {
    store: Store,
}

impl AsyncStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The synchronous store behind this facade
    pub fn blocking(&self) -> &Store {
        &self.store
    }

    async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Store) -> Result<R> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Background(e.to_string()))?
    }

    // ========== Stocks ==========

    pub async fn insert_stock(&self, stock: Stock) -> Result<i64> {
        self.run(move |s| s.insert_stock(&stock)).await
    }

    pub async fn insert_stocks(&self, stocks: Vec<Stock>) -> Result<Vec<i64>> {
        self.run(move |s| s.insert_stocks(&stocks)).await
    }

    pub async fn update_stock(&self, stock: Stock) -> Result<usize> {
        self.run(move |s| s.update_stock(&stock)).await
    }

    pub async fn delete_stock(&self, id: i64) -> Result<usize> {
        self.run(move |s| s.delete_stock(id)).await
    }

    pub async fn delete_all_stocks(&self) -> Result<usize> {
        self.run(|s| s.delete_all_stocks()).await
    }

    pub async fn get_stock(&self, id: i64) -> Result<Option<Stock>> {
        self.run(move |s| s.get_stock(id)).await
    }

    pub async fn all_stocks_snapshot(&self) -> Result<Vec<Stock>> {
        self.run(|s| s.all_stocks_snapshot()).await
    }

    // ========== Transactions ==========

    pub async fn insert_transaction(&self, transaction: TransactionHistory) -> Result<i64> {
        self.run(move |s| s.insert_transaction(&transaction)).await
    }

    pub async fn insert_transactions(&self, transactions: Vec<TransactionHistory>) -> Result<Vec<i64>> {
        self.run(move |s| s.insert_transactions(&transactions)).await
    }

    /// See [`Store::record_transaction`]
    pub async fn record_transaction(&self, transaction: TransactionHistory) -> Result<(TransactionHistory, Stock)> {
        self.run(move |s| s.record_transaction(&transaction)).await
    }

    pub async fn delete_all_transactions(&self) -> Result<usize> {
        self.run(|s| s.delete_all_transactions()).await
    }

    pub async fn transactions_for_stock(&self, stock_id: i64) -> Result<Vec<TransactionHistory>> {
        self.run(move |s| s.transactions_for_stock(stock_id)).await
    }

    pub async fn all_transactions_snapshot(&self) -> Result<Vec<TransactionHistory>> {
        self.run(|s| s.all_transactions_snapshot()).await
    }

    // ========== Daily history ==========

    pub async fn insert_daily_history(&self, history: DailyAssetHistory) -> Result<()> {
        self.run(move |s| s.insert_daily_history(&history)).await
    }

    pub async fn insert_daily_histories(&self, histories: Vec<DailyAssetHistory>) -> Result<()> {
        self.run(move |s| s.insert_daily_histories(&histories)).await
    }

    pub async fn delete_all_daily_history(&self) -> Result<usize> {
        self.run(|s| s.delete_all_daily_history()).await
    }

    pub async fn daily_history(&self) -> Result<Vec<DailyAssetHistory>> {
        self.run(|s| s.daily_history()).await
    }

    pub async fn all_daily_history_snapshot(&self) -> Result<Vec<DailyAssetHistory>> {
        self.run(|s| s.all_daily_history_snapshot()).await
    }

    // ========== Stock history ==========

    pub async fn insert_stock_history(&self, history: StockHistory) -> Result<i64> {
        self.run(move |s| s.insert_stock_history(&history)).await
    }

    pub async fn insert_stock_histories(&self, histories: Vec<StockHistory>) -> Result<Vec<i64>> {
        self.run(move |s| s.insert_stock_histories(&histories)).await
    }

    /// See [`Store::record_snapshot`]
    pub async fn record_snapshot(&self, daily: DailyAssetHistory, stocks: Vec<StockHistory>) -> Result<Vec<i64>> {
        self.run(move |s| s.record_snapshot(&daily, &stocks)).await
    }

    pub async fn delete_all_stock_history(&self) -> Result<usize> {
        self.run(|s| s.delete_all_stock_history()).await
    }

    pub async fn stock_history(&self, stock_id: i64) -> Result<Vec<StockHistory>> {
        self.run(move |s| s.stock_history(stock_id)).await
    }

    pub async fn all_stock_history_snapshot(&self) -> Result<Vec<StockHistory>> {
        self.run(|s| s.all_stock_history_snapshot()).await
    }

    // ========== Whole store ==========

    pub async fn clear_all_tables(&self) -> Result<()> {
        self.run(|s| s.clear_all_tables()).await
    }

    pub async fn reset_schema(&self) -> Result<()> {
        self.run(|s| s.reset_schema()).await
    }

    pub async fn export_backup(&self) -> Result<Backup> {
        self.run(|s| s.export_backup()).await
    }

    pub async fn export_backup_at(&self, timestamp: i64) -> Result<Backup> {
        self.run(move |s| s.export_backup_at(timestamp)).await
    }

    pub async fn restore_backup(&self, backup: Backup) -> Result<()> {
        self.run(move |s| s.restore_backup(&backup)).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.run(|s| s.stats()).await
    }

    // ========== Live queries ==========
    //
    // Registration runs one query under the connection lock and returns;
    // later results arrive on the `LiveQuery` channel.

    pub fn observe_stocks(&self) -> Result<LiveQuery<Stock>> {
        self.store.observe_stocks()
    }

    pub fn observe_transactions(&self, stock_id: i64) -> Result<LiveQuery<TransactionHistory>> {
        self.store.observe_transactions(stock_id)
    }

    pub fn observe_daily_history(&self) -> Result<LiveQuery<DailyAssetHistory>> {
        self.store.observe_daily_history()
    }

    pub fn observe_stock_history(&self, stock_id: i64) -> Result<LiveQuery<StockHistory>> {
        self.store.observe_stock_history(stock_id)
    }

    pub fn live_query_count(&self) -> usize {
        self.store.live_query_count()
    }
}

impl From<Store> for AsyncStore {
    fn from(store: Store) -> Self {
        Self::new(store)
    }
}
