//! Database schema definitions
//!
//! Every table is described once by a column-descriptor list. CREATE TABLE
//! statements, on-disk validation and the identity hash are all derived
//! from these descriptors, so the three can never drift apart.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 6;

/// Fixed key of the single identity row in the master table
pub const IDENTITY_KEY: i64 = 42;

/// Name of the identity table
pub const MASTER_TABLE: &str = "store_master";

/// Prefix of full-text-search sync triggers dropped before migrating
pub const FTS_TRIGGER_PREFIX: &str = "fts_content_sync_";

/// SQL to create the identity table
pub const CREATE_MASTER_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS store_master (id INTEGER PRIMARY KEY, identity_hash TEXT)";

/// The four data tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Stocks,
    Transactions,
    DailyAssetHistory,
    StockHistory,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Stocks => "stocks",
            Table::Transactions => "transactions",
            Table::DailyAssetHistory => "daily_asset_history",
            Table::StockHistory => "stock_history",
        }
    }

    /// All data tables, in creation order
    pub fn all() -> &'static [Table] {
        &[
            Table::Stocks,
            Table::Transactions,
            Table::DailyAssetHistory,
            Table::StockHistory,
        ]
    }

    pub fn columns(&self) -> &'static [ColumnDef] {
        match self {
            Table::Stocks => STOCK_COLUMNS,
            Table::Transactions => TRANSACTION_COLUMNS,
            Table::DailyAssetHistory => DAILY_ASSET_HISTORY_COLUMNS,
            Table::StockHistory => STOCK_HISTORY_COLUMNS,
        }
    }
}

impl FromStr for Table {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidValue(format!("Unknown table: {}", s)))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SQL storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }
}

/// Static description of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub affinity: Affinity,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub default: Option<&'static str>,
}

impl ColumnDef {
    const fn new(name: &'static str, affinity: Affinity) -> Self {
        Self {
            name,
            affinity,
            not_null: true,
            primary_key: false,
            autoincrement: false,
            default: None,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, Affinity::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, Affinity::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, Affinity::Text)
    }

    pub const fn nullable(self) -> Self {
        Self { not_null: false, ..self }
    }

    pub const fn primary_key(self) -> Self {
        Self { primary_key: true, ..self }
    }

    /// Auto-assigned integer key; a bound value of 0 asks the engine for a new id
    pub const fn auto_key(self) -> Self {
        Self {
            primary_key: true,
            autoincrement: true,
            ..self
        }
    }

    pub const fn default_value(self, expr: &'static str) -> Self {
        Self {
            default: Some(expr),
            ..self
        }
    }

    /// Column definition as it appears inside CREATE TABLE / ALTER TABLE
    pub fn definition(&self) -> String {
        let mut def = format!("`{}` {}", self.name, self.affinity.as_str());
        if self.autoincrement {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(expr) = self.default {
            def.push_str(" DEFAULT ");
            def.push_str(expr);
        }
        def
    }

    /// Placeholder used when binding this column in an INSERT
    pub fn placeholder(&self) -> &'static str {
        if self.autoincrement { "nullif(?, 0)" } else { "?" }
    }
}

pub const STOCK_COLUMNS: &[ColumnDef] = &[
    ColumnDef::integer("id").auto_key(),
    ColumnDef::text("name"),
    ColumnDef::text("ticker"),
    ColumnDef::real("vValue"),
    ColumnDef::real("gValue"),
    ColumnDef::real("pool"),
    ColumnDef::integer("quantity"),
    ColumnDef::real("investedPrincipal"),
    ColumnDef::real("currentPrice"),
    ColumnDef::text("currency"),
    ColumnDef::integer("startDate").default_value("0"),
    ColumnDef::real("defaultRecalcAmount").default_value("0.0"),
];

pub const TRANSACTION_COLUMNS: &[ColumnDef] = &[
    ColumnDef::integer("id").auto_key(),
    ColumnDef::integer("stockId"),
    ColumnDef::integer("date"),
    ColumnDef::text("type"),
    ColumnDef::real("price"),
    ColumnDef::integer("quantity"),
    ColumnDef::real("amount"),
    ColumnDef::real("previousV").nullable(),
    ColumnDef::real("newV").nullable(),
];

pub const DAILY_ASSET_HISTORY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::text("date").primary_key(),
    ColumnDef::real("totalPrincipal"),
    ColumnDef::real("totalCurrentValue"),
];

pub const STOCK_HISTORY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::integer("id").auto_key(),
    ColumnDef::integer("stockId"),
    ColumnDef::integer("timestamp"),
    ColumnDef::real("vValue"),
    ColumnDef::real("gValue"),
    ColumnDef::real("currentPrice"),
    ColumnDef::integer("quantity"),
    ColumnDef::real("pool"),
    ColumnDef::real("investedPrincipal"),
];

/// SQL to create a data table
pub fn create_table_sql(table: Table) -> String {
    let columns = table.columns();
    let mut parts: Vec<String> = columns.iter().map(ColumnDef::definition).collect();

    // Natural keys are declared as a table constraint
    let keys: Vec<String> = columns
        .iter()
        .filter(|c| c.primary_key && !c.autoincrement)
        .map(|c| format!("`{}`", c.name))
        .collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS `{}` ({})",
        table.as_str(),
        parts.join(", ")
    )
}

pub fn drop_table_sql(table: Table) -> String {
    format!("DROP TABLE IF EXISTS `{}`", table.as_str())
}

/// All schema creation statements
pub fn all_schema_statements() -> Vec<String> {
    let mut stmts: Vec<String> = Table::all().iter().map(|t| create_table_sql(*t)).collect();
    stmts.push(CREATE_MASTER_TABLE.to_string());
    stmts
}

/// Content hash of the expected schema.
///
/// Any change to a column descriptor changes the hash, which makes an
/// existing store fail its identity check until a migration is added.
pub fn identity_hash() -> String {
    let canonical = Table::all()
        .iter()
        .map(|t| create_table_sql(*t))
        .collect::<Vec<_>>()
        .join("\n");
    blake3::hash(canonical.as_bytes()).to_string()
}

/// Create every data table plus the identity table
pub fn create_all_tables(conn: &Connection) -> rusqlite::Result<()> {
    for stmt in all_schema_statements() {
        conn.execute(&stmt, [])?;
    }
    Ok(())
}

pub fn master_table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [MASTER_TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn read_identity(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT identity_hash FROM store_master WHERE id = ?1",
        [IDENTITY_KEY],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
}

pub fn write_identity(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(CREATE_MASTER_TABLE, [])?;
    conn.execute(
        "INSERT OR REPLACE INTO store_master (id, identity_hash) VALUES (?1, ?2)",
        rusqlite::params![IDENTITY_KEY, identity_hash()],
    )?;
    Ok(())
}

/// Drop full-text-search sync triggers so a migration can rebuild tables freely
pub fn drop_fts_sync_triggers(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'trigger'")?;
    let triggers: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut dropped = 0;
    for name in triggers.iter().filter(|n| n.starts_with(FTS_TRIGGER_PREFIX)) {
        conn.execute(&format!("DROP TRIGGER IF EXISTS `{}`", name), [])?;
        dropped += 1;
    }
    Ok(dropped)
}

/// One column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key_position: i64,
    pub default_value: Option<String>,
}

/// Shape of a table, columns sorted by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// The shape a table must have according to its descriptors
    pub fn expected(table: Table) -> Self {
        let mut key_position = 0;
        let mut columns: Vec<ColumnInfo> = table
            .columns()
            .iter()
            .map(|c| {
                let primary_key_position = if c.primary_key {
                    key_position += 1;
                    key_position
                } else {
                    0
                };
                ColumnInfo {
                    name: c.name.to_string(),
                    declared_type: c.affinity.as_str().to_string(),
                    not_null: c.not_null,
                    primary_key_position,
                    default_value: c.default.map(str::to_string),
                }
            })
            .collect();
        columns.sort();
        Self {
            name: table.as_str().to_string(),
            columns,
        }
    }

    /// Read the shape of a table from disk; a missing table has no columns
    pub fn read(conn: &Connection, name: &str) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(`{}`)", name))?;
        let mut columns: Vec<ColumnInfo> = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get::<_, String>(2)?.to_uppercase(),
                    not_null: row.get::<_, i64>(3)? != 0,
                    default_value: row.get(4)?,
                    primary_key_position: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        columns.sort();
        Ok(Self {
            name: name.to_string(),
            columns,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", c.name, c.declared_type)?;
            if c.not_null {
                write!(f, " NOT NULL")?;
            }
            if c.primary_key_position > 0 {
                write!(f, " PK{}", c.primary_key_position)?;
            }
            if let Some(d) = &c.default_value {
                write!(f, " DEFAULT {}", d)?;
            }
        }
        write!(f, ")")
    }
}

/// Compare every data table on disk against its descriptors
pub fn validate_all(conn: &Connection) -> crate::Result<()> {
    for table in Table::all() {
        let expected = TableInfo::expected(*table);
        let found = TableInfo::read(conn, table.as_str())?;
        if expected != found {
            return Err(crate::Error::SchemaMismatch {
                table: table.as_str().to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_table_sql() {
        let sql = create_table_sql(Table::Stocks);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `stocks` (`id` INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"));
        assert!(sql.contains("`startDate` INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.ends_with("`defaultRecalcAmount` REAL NOT NULL DEFAULT 0.0)"));
    }

    #[test]
    fn test_natural_key_is_table_constraint() {
        let sql = create_table_sql(Table::DailyAssetHistory);
        assert!(sql.contains("`date` TEXT NOT NULL"));
        assert!(sql.ends_with("PRIMARY KEY(`date`))"));
    }

    #[test]
    fn test_nullable_snapshot_columns() {
        let sql = create_table_sql(Table::Transactions);
        assert!(sql.contains("`previousV` REAL,"));
        assert!(sql.ends_with("`newV` REAL)"));
    }

    #[test]
    fn test_fresh_tables_validate() {
        let conn = Connection::open_in_memory().unwrap();
        create_all_tables(&conn).unwrap();
        validate_all(&conn).unwrap();

        for table in Table::all() {
            let found = TableInfo::read(&conn, table.as_str()).unwrap();
            assert_eq!(found, TableInfo::expected(*table));
        }
    }

    #[test]
    fn test_missing_table_fails_validation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(&create_table_sql(Table::Stocks), []).unwrap();

        let err = validate_all(&conn).unwrap_err();
        assert!(matches!(err, crate::Error::SchemaMismatch { ref table, .. } if table == "transactions"));
    }

    #[test]
    fn test_identity_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!master_table_exists(&conn).unwrap());

        write_identity(&conn).unwrap();
        assert!(master_table_exists(&conn).unwrap());
        assert_eq!(read_identity(&conn).unwrap(), Some(identity_hash()));
    }

    #[test]
    fn test_drop_fts_triggers_only() {
        let conn = Connection::open_in_memory().unwrap();
        create_all_tables(&conn).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fts_content_sync_stocks_BEFORE_DELETE BEFORE DELETE ON stocks BEGIN SELECT 1; END;
             CREATE TRIGGER audit_stocks AFTER INSERT ON stocks BEGIN SELECT 1; END;",
        )
        .unwrap();

        assert_eq!(drop_fts_sync_triggers(&conn).unwrap(), 1);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_table_from_str() {
        assert_eq!("stock_history".parse::<Table>().unwrap(), Table::StockHistory);
        assert!("holdings".parse::<Table>().is_err());
    }
}
