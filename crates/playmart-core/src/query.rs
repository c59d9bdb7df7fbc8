//! Read-only aggregate queries over the analytical relations.
//!
//! All functions take a shared `&Connection` and return typed structs. They
//! read committed state only and never write.

use rusqlite::{Connection, params};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A song ranked by play count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopSong {
    pub song_id: String,
    /// `None` when the play references a song id missing from `songs`.
    pub title: Option<String>,
    pub play_count: u64,
}

/// A user ranked by play count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUser {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub play_count: u64,
}

/// Timestamps (epoch microseconds, 0 = never) of the last committed stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageMarks {
    pub schema_version: i64,
    pub last_load_at_us: i64,
    pub last_build_at_us: i64,
    pub last_merge_at_us: i64,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Number of rows in the `users` dimension.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn total_users(conn: &Connection) -> rusqlite::Result<u64> {
    count(conn, "SELECT COUNT(*) FROM users")
}

/// Number of rows in the `songs` dimension.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn total_songs(conn: &Connection) -> rusqlite::Result<u64> {
    count(conn, "SELECT COUNT(*) FROM songs")
}

/// Top `n` songs by play count, ties broken by ascending `song_id`. Plays
/// without a resolved song are not counted.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn top_songs(conn: &Connection, n: usize) -> rusqlite::Result<Vec<TopSong>> {
    let mut stmt = conn.prepare_cached(
        "SELECT sp.song_id, s.title, COUNT(*) AS plays
         FROM songplays sp
         LEFT JOIN songs s ON s.song_id = sp.song_id
         WHERE sp.song_id IS NOT NULL
         GROUP BY sp.song_id
         ORDER BY plays DESC, sp.song_id ASC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit(n)], |row| {
        Ok(TopSong {
            song_id: row.get(0)?,
            title: row.get(1)?,
            play_count: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Top `n` users by play count, ties broken by ascending `user_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn top_users(conn: &Connection, n: usize) -> rusqlite::Result<Vec<TopUser>> {
    let mut stmt = conn.prepare_cached(
        "SELECT sp.user_id, u.first_name, u.last_name, COUNT(*) AS plays
         FROM songplays sp
         LEFT JOIN users u ON u.user_id = sp.user_id
         GROUP BY sp.user_id
         ORDER BY plays DESC, sp.user_id ASC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit(n)], |row| {
        Ok(TopUser {
            user_id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            play_count: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Read the stage bookkeeping row.
///
/// # Errors
///
/// Returns an error if `warehouse_meta` is missing or unreadable.
pub fn stage_marks(conn: &Connection) -> rusqlite::Result<StageMarks> {
    conn.query_row(
        "SELECT schema_version, last_load_at_us, last_build_at_us, last_merge_at_us
         FROM warehouse_meta WHERE id = 1",
        [],
        |row| {
            Ok(StageMarks {
                schema_version: row.get(0)?,
                last_load_at_us: row.get(1)?,
                last_build_at_us: row.get(2)?,
                last_merge_at_us: row.get(3)?,
            })
        },
    )
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<u64> {
    conn.query_row(sql, [], |row| row.get(0))
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
