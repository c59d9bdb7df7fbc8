//! Full-refresh builds of the `users`, `songs`, `artists` and `time`
//! dimensions from the staging relations.
//!
//! Each dimension is replaced inside its own transaction. A failing relation
//! rolls back alone; relations built before it stay committed.

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Transaction, params};
use std::time::{Duration, Instant};

use super::time::{TimeParts, decompose};
use crate::db::{self, Progress, schema};
use crate::error::{PipelineError, Stage, TransformError};

/// Latest row per user id: newest integer `ts`, then the most recently
/// loaded row. Rows with a non-integer `ts` never outrank a valid one, since
/// SQLite sorts TEXT above every INTEGER.
const USERS_SQL: &str = "
INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT user_id, first_name, last_name, gender, level
FROM (
    SELECT
        user_id, first_name, last_name, gender, level,
        ROW_NUMBER() OVER (
            PARTITION BY user_id
            ORDER BY typeof(ts) = 'integer' DESC, ts DESC, rowid DESC
        ) AS rn
    FROM staging_events
    WHERE user_id IS NOT NULL
)
WHERE rn = 1
";

/// First loaded row per song id.
const SONGS_SQL: &str = "
INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT song_id, title, artist_id, year, duration
FROM (
    SELECT
        song_id, title, artist_id, year, duration,
        ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY rowid) AS rn
    FROM staging_songs
    WHERE song_id IS NOT NULL
)
WHERE rn = 1
";

/// First loaded row per artist id.
const ARTISTS_SQL: &str = "
INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
FROM (
    SELECT
        artist_id, artist_name, artist_location, artist_latitude, artist_longitude,
        ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY rowid) AS rn
    FROM staging_songs
    WHERE artist_id IS NOT NULL
)
WHERE rn = 1
";

/// Row counts written by [`DimensionBuilder::build_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionReport {
    pub users: usize,
    pub songs: usize,
    pub artists: usize,
    pub time: usize,
    pub elapsed: Duration,
}

pub struct DimensionBuilder<'conn> {
    conn: &'conn Connection,
}

impl<'conn> DimensionBuilder<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Rebuild all four dimensions in order: users, songs, artists, time.
    ///
    /// # Errors
    ///
    /// Stops at the first failing relation and returns its stage.
    pub fn build_all(&self) -> Result<DimensionReport, PipelineError> {
        let start = Instant::now();

        let users = self.build_users()?;
        let songs = self.build_songs()?;
        let artists = self.build_artists()?;
        let time = self.build_time()?;

        let elapsed = start.elapsed();
        tracing::info!(
            users,
            songs,
            artists,
            time,
            elapsed_ms = elapsed.as_millis(),
            "dimension build complete"
        );

        Ok(DimensionReport {
            users,
            songs,
            artists,
            time,
            elapsed,
        })
    }

    /// # Errors
    ///
    /// Returns a `build:users` error; the previous `users` rows are kept.
    pub fn build_users(&self) -> Result<usize, PipelineError> {
        self.replace(Stage::BuildUsers, schema::USERS, |tx| Ok(tx.execute(USERS_SQL, [])?))
    }

    /// # Errors
    ///
    /// Returns a `build:songs` error; the previous `songs` rows are kept.
    pub fn build_songs(&self) -> Result<usize, PipelineError> {
        self.replace(Stage::BuildSongs, schema::SONGS, |tx| Ok(tx.execute(SONGS_SQL, [])?))
    }

    /// # Errors
    ///
    /// Returns a `build:artists` error; the previous `artists` rows are kept.
    pub fn build_artists(&self) -> Result<usize, PipelineError> {
        self.replace(Stage::BuildArtists, schema::ARTISTS, |tx| {
            Ok(tx.execute(ARTISTS_SQL, [])?)
        })
    }

    /// One row per distinct event timestamp, from every page type.
    ///
    /// # Errors
    ///
    /// Returns a `build:time` error, including
    /// [`TransformError::MalformedTimestamp`] when a `ts` is not an integer
    /// or is outside the representable calendar range.
    pub fn build_time(&self) -> Result<usize, PipelineError> {
        self.replace(Stage::BuildTime, schema::TIME, |tx| {
            let timestamps = {
                let mut select = tx.prepare(
                    "SELECT DISTINCT ts FROM staging_events WHERE ts IS NOT NULL ORDER BY ts",
                )?;
                select
                    .query_map([], |row| row.get::<_, SqlValue>(0))?
                    .collect::<Result<Vec<_>, _>>()?
            };

            let mut insert = tx.prepare(
                "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for value in &timestamps {
                let parts = timestamp_parts(value)?;
                insert.execute(params![
                    parts.start_time,
                    parts.hour,
                    parts.day,
                    parts.week,
                    parts.month,
                    parts.year,
                    parts.weekday,
                ])?;
            }
            Ok(timestamps.len())
        })
    }

    fn replace<F>(&self, stage: Stage, table: &str, fill: F) -> Result<usize, PipelineError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<usize, TransformError>,
    {
        let run = || -> Result<usize, TransformError> {
            let tx = self.conn.unchecked_transaction()?;
            tx.execute(&format!("DELETE FROM {table}"), [])?;
            let rows = fill(&tx)?;
            db::record_progress(&tx, Progress::Build)?;
            tx.commit()?;
            Ok(rows)
        };

        match run() {
            Ok(rows) => {
                tracing::info!(stage = %stage, relation = table, rows, "dimension rebuilt");
                Ok(rows)
            }
            Err(error) => {
                tracing::warn!(stage = %stage, relation = table, error = %error, "dimension build failed");
                Err(PipelineError::transform(stage, error))
            }
        }
    }
}

fn timestamp_parts(value: &SqlValue) -> Result<TimeParts, TransformError> {
    let malformed = |value: String| TransformError::MalformedTimestamp { value };
    match value {
        SqlValue::Integer(ms) => decompose(*ms).ok_or_else(|| malformed(ms.to_string())),
        SqlValue::Real(ms) => Err(malformed(ms.to_string())),
        SqlValue::Text(text) => Err(malformed(format!("'{text}'"))),
        SqlValue::Blob(bytes) => Err(malformed(format!("<{} byte blob>", bytes.len()))),
        SqlValue::Null => Err(malformed("NULL".to_string())),
    }
}
