//! Warehouse schema migrations and lifecycle helpers.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &[&str])] = &[(1, schema::MIGRATION_V1), (2, schema::MIGRATION_V2)];

/// Read `PRAGMA user_version` and convert it to a Rust `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the version value cannot be
/// represented as `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// A migration only runs when its version is above `user_version`, and all
/// DDL uses `IF NOT EXISTS`, so calling this on an up-to-date warehouse is a
/// no-op.
///
/// # Errors
///
/// Returns an error if any migration fails. The failing version is rolled
/// back; earlier versions stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, statements) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        for sql in *statements {
            tx.execute_batch(sql)?;
        }
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.execute(
            "UPDATE warehouse_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(*version)],
        )?;
        tx.commit()?;
        tracing::debug!(version, "applied warehouse migration");
        current = *version;
    }

    Ok(current)
}

/// Drop and recreate both staging relations, leaving them empty.
///
/// # Errors
///
/// Returns an error if any DDL statement fails; nothing is dropped in that
/// case.
pub fn reset_staging(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for table in schema::STAGING_TABLES {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    }
    tx.execute_batch(schema::STAGING_TABLES_SQL)?;
    tx.execute_batch(schema::STAGING_INDEXES_SQL)?;
    tx.commit()
}

/// Drop every playmart relation and migrate back to the latest schema.
///
/// # Errors
///
/// Returns an error if dropping or re-migrating fails.
pub fn reset(conn: &mut Connection) -> rusqlite::Result<u32> {
    let tx = conn.transaction()?;
    for table in schema::STAGING_TABLES
        .iter()
        .chain(schema::ANALYTICAL_TABLES)
        .chain(std::iter::once(&"warehouse_meta"))
    {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    }
    tx.pragma_update(None, "user_version", 0_i64)?;
    tx.commit()?;

    migrate(conn)
}
