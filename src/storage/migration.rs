//! Migration chain
//!
//! Migrations are forward-only steps between two schema versions. The chain
//! plans a path from the store's `user_version` to the target; any gap, or a
//! store newer than the target, is reported instead of silently skipped.

use crate::{Error, Result};
use rusqlite::Connection;

/// A single versioned schema transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub from: u32,
    pub to: u32,
    pub name: &'static str,
    statements: &'static [&'static str],
}

impl Migration {
    pub const fn new(
        from: u32,
        to: u32,
        name: &'static str,
        statements: &'static [&'static str],
    ) -> Self {
        Self {
            from,
            to,
            name,
            statements,
        }
    }

    pub fn statements(&self) -> &'static [&'static str] {
        self.statements
    }

    pub fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        for stmt in self.statements {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }
}

/// v4 → v5: investment start date
pub const MIGRATION_4_5: Migration = Migration::new(
    4,
    5,
    "add_stock_start_date",
    &["ALTER TABLE `stocks` ADD COLUMN `startDate` INTEGER NOT NULL DEFAULT 0"],
);

/// v5 → v6: default deposit/withdrawal amount for V recalculation
pub const MIGRATION_5_6: Migration = Migration::new(
    5,
    6,
    "add_stock_default_recalc_amount",
    &["ALTER TABLE `stocks` ADD COLUMN `defaultRecalcAmount` REAL NOT NULL DEFAULT 0.0"],
);

/// Ordered set of migrations a store can be upgraded through
#[derive(Debug, Clone)]
pub struct MigrationChain {
    steps: Vec<Migration>,
}

impl MigrationChain {
    /// An empty chain; only fresh stores and stores already at the target can open
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn with(mut self, migration: Migration) -> Self {
        self.steps.push(migration);
        self
    }

    pub fn steps(&self) -> &[Migration] {
        &self.steps
    }

    /// Migrations to run, in order, to go from `from` to `to`.
    ///
    /// At each version the step reaching furthest without passing `to` is
    /// taken.
    pub fn plan(&self, from: u32, to: u32) -> Result<Vec<&Migration>> {
        if from > to {
            return Err(Error::MigrationPathMissing { from, to });
        }

        let mut path = Vec::new();
        let mut current = from;
        while current < to {
            let next = self
                .steps
                .iter()
                .filter(|m| m.from == current && m.to > current && m.to <= to)
                .max_by_key(|m| m.to)
                .ok_or(Error::MigrationPathMissing { from, to })?;
            path.push(next);
            current = next.to;
        }
        Ok(path)
    }

    /// Plan and apply every step from `from` to `to` on `conn`
    pub fn apply(&self, conn: &Connection, from: u32, to: u32) -> Result<u32> {
        let plan = self.plan(from, to)?;
        for migration in &plan {
            tracing::debug!(
                "Applying migration {} ({} -> {})",
                migration.name,
                migration.from,
                migration.to
            );
            migration.apply(conn)?;
        }
        Ok(plan.last().map(|m| m.to).unwrap_or(from))
    }
}

impl Default for MigrationChain {
    fn default() -> Self {
        Self::empty().with(MIGRATION_4_5).with(MIGRATION_5_6)
    }
}

/// Build the version 4 layout, as it existed before `startDate`
#[cfg(test)]
pub(crate) fn create_v4_schema(conn: &Connection) -> rusqlite::Result<()> {
    use super::schema::{Table, create_table_sql};

    conn.execute(
        "CREATE TABLE IF NOT EXISTS `stocks` (`id` INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, `name` TEXT NOT NULL, `ticker` TEXT NOT NULL, `vValue` REAL NOT NULL, `gValue` REAL NOT NULL, `pool` REAL NOT NULL, `quantity` INTEGER NOT NULL, `investedPrincipal` REAL NOT NULL, `currentPrice` REAL NOT NULL, `currency` TEXT NOT NULL)",
        [],
    )?;
    for table in [Table::Transactions, Table::DailyAssetHistory, Table::StockHistory] {
        conn.execute(&create_table_sql(table), [])?;
    }
    conn.pragma_update(None, "user_version", 4)?;
    Ok(())
}
