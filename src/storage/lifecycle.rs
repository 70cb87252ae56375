//! Store open sequence
//!
//! On open the store is in one of four states, read from `user_version`:
//! - 0: fresh file, every table is created
//! - below the current version: the migration chain upgrades it
//! - equal: the identity hash must match
//! - anything else: no path, fatal unless destructive fallback is enabled

use super::migration::MigrationChain;
use super::schema::{self, SCHEMA_VERSION, Table};
use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::Arc;

/// Hooks into the store lifecycle. Every method defaults to doing nothing.
pub trait StoreCallback: Send + Sync {
    /// After all tables were created on a fresh store
    fn on_create(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// After the store passed validation, before it is handed out
    fn on_open(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// Before the first migration step runs
    fn on_pre_migrate(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// After the last migration step, before validation
    fn on_post_migrate(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// Before `table` is dropped by a destructive reset
    fn on_table_dropped(&self, _conn: &Connection, _table: Table) -> rusqlite::Result<()> {
        Ok(())
    }
}

pub(crate) type Callbacks = [Arc<dyn StoreCallback>];

/// What the open sequence did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Created,
    Migrated { from: u32 },
    Verified,
    Recreated { from: u32 },
}

pub(crate) fn user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn set_user_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

pub(crate) fn initialize(
    conn: &mut Connection,
    chain: &MigrationChain,
    callbacks: &Callbacks,
    destructive_fallback: bool,
) -> Result<OpenOutcome> {
    let version = user_version(conn)?;

    let outcome = if version == 0 {
        create(conn, callbacks)?;
        OpenOutcome::Created
    } else if version == SCHEMA_VERSION {
        verify_identity(conn)?;
        OpenOutcome::Verified
    } else {
        match chain.plan(version, SCHEMA_VERSION) {
            Ok(_) => {
                migrate(conn, chain, callbacks, version)?;
                OpenOutcome::Migrated { from: version }
            }
            Err(e) if destructive_fallback => {
                tracing::warn!("{}; dropping all tables", e);
                recreate(conn, callbacks)?;
                OpenOutcome::Recreated { from: version }
            }
            Err(e) => return Err(e),
        }
    };

    for cb in callbacks {
        cb.on_open(conn)?;
    }
    Ok(outcome)
}

fn create(conn: &mut Connection, callbacks: &Callbacks) -> Result<()> {
    let tx = conn.transaction()?;
    schema::create_all_tables(&tx)?;
    schema::write_identity(&tx)?;
    set_user_version(&tx, SCHEMA_VERSION)?;
    for cb in callbacks {
        cb.on_create(&tx)?;
    }
    tx.commit()?;
    tracing::info!("Created store schema at version {}", SCHEMA_VERSION);
    Ok(())
}

fn migrate(
    conn: &mut Connection,
    chain: &MigrationChain,
    callbacks: &Callbacks,
    from: u32,
) -> Result<()> {
    let tx = conn.transaction()?;

    let dropped = schema::drop_fts_sync_triggers(&tx)?;
    if dropped > 0 {
        tracing::debug!("Dropped {} FTS sync triggers before migrating", dropped);
    }
    for cb in callbacks {
        cb.on_pre_migrate(&tx)?;
    }

    chain.apply(&tx, from, SCHEMA_VERSION)?;

    for cb in callbacks {
        cb.on_post_migrate(&tx)?;
    }

    schema::validate_all(&tx)?;
    schema::write_identity(&tx)?;
    set_user_version(&tx, SCHEMA_VERSION)?;
    tx.commit()?;

    tracing::info!("Migrated store from version {} to {}", from, SCHEMA_VERSION);
    Ok(())
}

fn verify_identity(conn: &Connection) -> Result<()> {
    let expected = schema::identity_hash();

    if !schema::master_table_exists(conn)? {
        // Written by something other than this crate: trust the tables if they match
        tracing::warn!("Store has no identity record; validating tables");
        schema::validate_all(conn)?;
        schema::write_identity(conn)?;
        return Ok(());
    }

    match schema::read_identity(conn)? {
        Some(found) if found == expected => Ok(()),
        found => Err(Error::IdentityMismatch {
            expected,
            found: found.unwrap_or_default(),
        }),
    }
}

/// Drop every data table, firing the teardown hook for each first
pub(crate) fn drop_all_tables(conn: &Connection, callbacks: &Callbacks) -> Result<()> {
    for table in Table::all() {
        for cb in callbacks {
            cb.on_table_dropped(conn, *table)?;
        }
        conn.execute(&schema::drop_table_sql(*table), [])?;
        tracing::debug!("Dropped table {}", table);
    }
    conn.execute("DROP TABLE IF EXISTS store_master", [])?;
    Ok(())
}

/// Drop and recreate the whole schema at the current version
pub(crate) fn recreate(conn: &mut Connection, callbacks: &Callbacks) -> Result<()> {
    let tx = conn.transaction()?;
    drop_all_tables(&tx, callbacks)?;
    schema::create_all_tables(&tx)?;
    schema::write_identity(&tx)?;
    set_user_version(&tx, SCHEMA_VERSION)?;
    for cb in callbacks {
        cb.on_create(&tx)?;
    }
    tx.commit()?;
    tracing::info!("Recreated store schema at version {}", SCHEMA_VERSION);
    Ok(())
}
