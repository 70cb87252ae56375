//! Generic row mapping
//!
//! Each record type binds its values and reads its columns positionally, in
//! the order of its table's column descriptors. The SQL for inserts, selects
//! and updates is generated from those descriptors, so one routine serves
//! all four tables.

use super::schema::{ColumnDef, Table};
use rusqlite::{Connection, Params, Row, ToSql};

/// What an INSERT does when it hits an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the statement and roll back the enclosing transaction
    Abort,
    /// Delete the conflicting row and insert the new one
    Replace,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Abort => "ABORT",
            ConflictPolicy::Replace => "REPLACE",
        }
    }
}

/// A record stored in one of the data tables.
///
/// `values` and `from_row` must follow the column order of
/// `Self::TABLE.columns()`; implementors pin the width with a const
/// assertion against the descriptor list.
pub trait Entity: Sized {
    const TABLE: Table;
    const ON_CONFLICT: ConflictPolicy;

    /// Bind values, one per column, in descriptor order
    fn values(&self) -> Vec<&dyn ToSql>;

    /// Build a record from a row selected with `select_sql`
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn columns() -> &'static [ColumnDef] {
        Self::TABLE.columns()
    }
}

/// A record with an auto-assigned integer key
pub trait Identified: Entity {
    fn id(&self) -> i64;
}

fn column_list(columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| format!("`{}`", c.name))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn insert_sql<E: Entity>() -> String {
    let columns = E::columns();
    let placeholders = columns
        .iter()
        .map(ColumnDef::placeholder)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "INSERT OR {} INTO `{}` ({}) VALUES ({})",
        E::ON_CONFLICT.as_str(),
        E::TABLE.as_str(),
        column_list(columns),
        placeholders
    )
}

/// SELECT of every column in descriptor order, followed by `clause`
pub fn select_sql<E: Entity>(clause: &str) -> String {
    let mut sql = format!("SELECT {} FROM `{}`", column_list(E::columns()), E::TABLE.as_str());
    if !clause.is_empty() {
        sql.push(' ');
        sql.push_str(clause);
    }
    sql
}

/// Rewrites every column of the row whose key matches the last bound value
pub fn update_sql<E: Identified>() -> String {
    let columns = E::columns();
    let assignments = columns
        .iter()
        .map(|c| format!("`{}` = ?", c.name))
        .collect::<Vec<_>>()
        .join(",");
    let key = columns
        .iter()
        .find(|c| c.primary_key)
        .map(|c| c.name)
        .unwrap_or("id");
    format!(
        "UPDATE OR ABORT `{}` SET {} WHERE `{}` = ?",
        E::TABLE.as_str(),
        assignments,
        key
    )
}

/// Insert rows one by one; returns the rowid assigned to each.
///
/// Callers run this inside a transaction so a failing row discards the batch.
pub fn insert_all<E: Entity>(conn: &Connection, rows: &[E]) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(&insert_sql::<E>())?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row.values();
        stmt.execute(values.as_slice())?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

pub fn update<E: Identified>(conn: &Connection, row: &E) -> rusqlite::Result<usize> {
    let id = row.id();
    let mut values = row.values();
    values.push(&id);
    let mut stmt = conn.prepare_cached(&update_sql::<E>())?;
    stmt.execute(values.as_slice())
}

pub fn query_all<E: Entity, P: Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> rusqlite::Result<Vec<E>> {
    let mut stmt = conn.prepare_cached(&select_sql::<E>(clause))?;
    let rows = stmt
        .query_map(params, |row| E::from_row(row))?
        .collect::<rusqlite::Result<Vec<E>>>()?;
    Ok(rows)
}

pub fn query_one<E: Entity, P: Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> rusqlite::Result<Option<E>> {
    let mut stmt = conn.prepare_cached(&select_sql::<E>(clause))?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(E::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn delete_all<E: Entity>(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(&format!("DELETE FROM `{}`", E::TABLE.as_str()), [])
}

pub fn count<E: Entity>(conn: &Connection) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM `{}`", E::TABLE.as_str()),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
