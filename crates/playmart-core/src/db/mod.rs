//! SQLite warehouse connection utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers can query while a stage writes
//! - `busy_timeout` from config to absorb transient lock contention
//! - `synchronous = NORMAL`

pub mod migrations;
pub mod schema;

use rusqlite::{Connection, OpenFlags};
use std::{path::Path, thread, time::Duration};

use crate::config::WarehouseConfig;
use crate::error::{PipelineError, Stage};

/// Path value that selects a private in-memory warehouse.
pub const IN_MEMORY: &str = ":memory:";

/// Open the warehouse, poll it until it answers, and migrate the schema.
///
/// # Errors
///
/// Returns [`PipelineError::Connectivity`] if the warehouse does not answer
/// within `connect_attempts` probes, or a `migrate` stage error if the schema
/// cannot be brought up to date.
pub fn open_warehouse(config: &WarehouseConfig) -> Result<Connection, PipelineError> {
    let mut conn = connect_with_retry(config)?;
    let version = migrations::migrate(&mut conn)
        .map_err(|source| PipelineError::transform(Stage::Migrate, source))?;
    tracing::debug!(version, "warehouse schema ready");
    Ok(conn)
}

/// Open and configure a connection, retrying up to `connect_attempts` times
/// with `connect_interval_ms` between attempts.
///
/// # Errors
///
/// Returns [`PipelineError::Connectivity`] carrying the last failure.
pub fn connect_with_retry(config: &WarehouseConfig) -> Result<Connection, PipelineError> {
    let attempts = config.connect_attempts.max(1);
    let interval = Duration::from_millis(config.connect_interval_ms);
    let target = config.path.display().to_string();

    let mut attempt = 1;
    loop {
        match try_connect(config) {
            Ok(conn) => {
                tracing::debug!(target = %target, attempt, "warehouse connection ready");
                return Ok(conn);
            }
            Err(source) if attempt >= attempts => {
                tracing::warn!(target = %target, attempts, error = %source, "warehouse unreachable");
                return Err(PipelineError::Connectivity {
                    target,
                    attempts,
                    source,
                });
            }
            Err(error) => {
                tracing::warn!(target = %target, attempt, error = %error, "warehouse not ready, retrying");
                attempt += 1;
                thread::sleep(interval);
            }
        }
    }
}

/// `warehouse_meta` column stamped when a stage commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Load,
    Build,
    Merge,
}

impl Progress {
    const fn column(self) -> &'static str {
        match self {
            Self::Load => "last_load_at_us",
            Self::Build => "last_build_at_us",
            Self::Merge => "last_merge_at_us",
        }
    }
}

/// Stamp `progress` with the current time. Call inside the stage's own
/// transaction so the mark commits or rolls back with it.
pub(crate) fn record_progress(conn: &Connection, progress: Progress) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE warehouse_meta SET {} = ?1 WHERE id = 1",
            progress.column()
        ),
        [chrono::Utc::now().timestamp_micros()],
    )?;
    Ok(())
}

fn try_connect(config: &WarehouseConfig) -> rusqlite::Result<Connection> {
    let conn = open_connection(&config.path, config.create_if_missing)?;
    configure_connection(&conn, Duration::from_millis(config.busy_timeout_ms))?;
    let _probe: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    Ok(conn)
}

fn open_connection(path: &Path, create_if_missing: bool) -> rusqlite::Result<Connection> {
    if path.as_os_str() == IN_MEMORY {
        return Connection::open_in_memory();
    }

    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    Connection::open_with_flags(path, flags)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{connect_with_retry, open_warehouse};
    use crate::config::WarehouseConfig;
    use crate::db::migrations;
    use crate::error::{ErrorCode, PipelineError};
    use tempfile::TempDir;

    fn temp_config() -> (TempDir, WarehouseConfig) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = WarehouseConfig {
            path: dir.path().join("playmart.sqlite3"),
            connect_interval_ms: 1,
            ..WarehouseConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn open_warehouse_sets_wal_and_busy_timeout() {
        let (_dir, mut config) = temp_config();
        config.busy_timeout_ms = 1_234;
        let conn = open_warehouse(&config).expect("open warehouse");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(busy_timeout_ms, 1_234);
    }

    #[test]
    fn open_warehouse_runs_migrations() {
        let (_dir, config) = temp_config();
        let conn = open_warehouse(&config).expect("open warehouse");

        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn missing_warehouse_without_create_is_unreachable() {
        let (_dir, mut config) = temp_config();
        config.create_if_missing = false;
        config.connect_attempts = 3;

        let err = connect_with_retry(&config).expect_err("must not connect");
        match &err {
            PipelineError::Connectivity { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.error_code(), ErrorCode::WarehouseUnreachable);
        assert!(!config.path.exists());
    }

    #[test]
    fn unreachable_directory_fails_after_attempts() {
        let (dir, mut config) = temp_config();
        config.path = dir.path().join("no/such/dir/dw.sqlite3");
        config.connect_attempts = 2;

        assert!(matches!(
            connect_with_retry(&config),
            Err(PipelineError::Connectivity { attempts: 2, .. })
        ));
    }

    #[test]
    fn in_memory_path_is_supported() {
        let config = WarehouseConfig {
            path: super::IN_MEMORY.into(),
            ..WarehouseConfig::default()
        };
        let conn = open_warehouse(&config).expect("open in-memory warehouse");
        let version = migrations::current_schema_version(&conn).expect("version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }
}
