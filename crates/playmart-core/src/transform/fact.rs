//! Merge of play events into the `songplays` fact relation.
//!
//! A merge runs three phases inside a single transaction:
//!
//! 1. materialize `temp.songplay_candidates` from `NextSong` events
//!    left-joined to the song catalog on exact title equality
//! 2. evict every fact row whose `(session_id, start_time)` is a candidate
//! 3. insert all candidates
//!
//! Any failure rolls all three phases back, so the fact relation is never
//! observed with rows evicted but not reinserted.

use rusqlite::{Connection, Transaction};
use std::time::{Duration, Instant};

use crate::db::{self, Progress};
use crate::error::{PipelineError, Stage, TransformError};

/// One candidate per natural key. When several events (or several catalog
/// matches) share a key, the most recently loaded event wins, then a matched
/// song, then the lowest song/artist id.
const MATERIALIZE_SQL: &str = "
DROP TABLE IF EXISTS temp.songplay_candidates;

CREATE TEMP TABLE songplay_candidates AS
SELECT start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
FROM (
    SELECT
        se.ts AS start_time,
        se.user_id,
        se.level,
        ss.song_id,
        ss.artist_id,
        se.session_id,
        se.location,
        se.user_agent,
        ROW_NUMBER() OVER (
            PARTITION BY se.session_id, se.ts
            ORDER BY se.rowid DESC, ss.song_id IS NULL, ss.song_id, ss.artist_id
        ) AS rn
    FROM staging_events se
    LEFT JOIN staging_songs ss ON ss.title = se.song
    WHERE se.page = 'NextSong'
)
WHERE rn = 1;
";

const EVICT_SQL: &str = "
DELETE FROM songplays
WHERE EXISTS (
    SELECT 1
    FROM temp.songplay_candidates c
    WHERE c.session_id = songplays.session_id
      AND c.start_time = songplays.start_time
)
";

const INSERT_SQL: &str = "
INSERT INTO songplays (
    start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
)
SELECT start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
FROM temp.songplay_candidates
ORDER BY start_time, session_id
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Distinct natural keys derived from staging.
    pub candidates: usize,
    /// Existing fact rows replaced by a candidate.
    pub evicted: usize,
    pub inserted: usize,
    /// Fact rows after the merge committed.
    pub fact_rows: usize,
    pub elapsed: Duration,
}

pub struct FactMerger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> FactMerger<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Merge staging play events into `songplays`.
    ///
    /// Re-running with unchanged staging yields the same set of natural rows;
    /// only the physical `songplay_id` values change.
    ///
    /// # Errors
    ///
    /// Returns a `merge:songplays` error; the fact relation is left exactly
    /// as it was before the call.
    pub fn merge(&self) -> Result<MergeReport, PipelineError> {
        let start = Instant::now();

        match self.merge_in_transaction() {
            Ok(mut report) => {
                report.elapsed = start.elapsed();
                tracing::info!(
                    stage = %Stage::MergeSongplays,
                    candidates = report.candidates,
                    evicted = report.evicted,
                    inserted = report.inserted,
                    fact_rows = report.fact_rows,
                    elapsed_ms = report.elapsed.as_millis(),
                    "fact merge complete"
                );
                Ok(report)
            }
            Err(error) => {
                tracing::warn!(stage = %Stage::MergeSongplays, error = %error, "fact merge rolled back");
                Err(PipelineError::transform(Stage::MergeSongplays, error))
            }
        }
    }

    fn merge_in_transaction(&self) -> Result<MergeReport, TransformError> {
        let tx = self.conn.unchecked_transaction()?;

        // Phase 1
        tx.execute_batch(MATERIALIZE_SQL)?;
        let candidates = count(&tx, "temp.songplay_candidates")?;
        tracing::debug!(candidates, "materialized songplay candidates");

        // Phase 2
        let evicted = tx.execute(EVICT_SQL, [])?;
        tracing::debug!(evicted, "evicted superseded songplays");

        // Phase 3
        let inserted = tx.execute(INSERT_SQL, [])?;

        tx.execute_batch("DROP TABLE temp.songplay_candidates")?;
        db::record_progress(&tx, Progress::Merge)?;
        let fact_rows = count(&tx, "songplays")?;
        tx.commit()?;

        Ok(MergeReport {
            candidates,
            evicted,
            inserted,
            fact_rows,
            elapsed: Duration::ZERO,
        })
    }
}

fn count(tx: &Transaction<'_>, table: &str) -> rusqlite::Result<usize> {
    tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::FactMerger;
    use crate::db::migrations;
    use crate::error::{ErrorCode, Stage};
    use rusqlite::{Connection, params};

    type FactRow = (
        i64,
        i64,
        String,
        Option<String>,
        Option<String>,
        i64,
        Option<String>,
        Option<String>,
    );

    fn warehouse() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    fn play(conn: &Connection, session_id: i64, ts: i64, user_id: i64, level: &str, song: &str) {
        conn.execute(
            "INSERT INTO staging_events (user_id, ts, page, song, session_id, level, location, user_agent)
             VALUES (?1, ?2, 'NextSong', ?3, ?4, ?5, 'X', 'A')",
            params![user_id, ts, song, session_id, level],
        )
        .expect("insert play");
    }

    fn catalog(conn: &Connection, song_id: &str, title: &str, artist_id: &str) {
        conn.execute(
            "INSERT INTO staging_songs (song_id, title, artist_id) VALUES (?1, ?2, ?3)",
            params![song_id, title, artist_id],
        )
        .expect("insert song");
    }

    fn facts(conn: &Connection) -> Vec<FactRow> {
        let mut stmt = conn
            .prepare(
                "SELECT start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
                 FROM songplays ORDER BY session_id, start_time",
            )
            .expect("prepare");
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows")
    }

    #[test]
    fn single_play_resolves_song_and_artist() {
        let conn = warehouse();
        play(&conn, 5, 1_000, 1, "free", "Foo");
        catalog(&conn, "S1", "Foo", "AR1");

        let report = FactMerger::new(&conn).merge().expect("merge");
        assert_eq!(report.candidates, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.fact_rows, 1);

        let rows = facts(&conn);
        assert_eq!(rows.len(), 1);
        let (start_time, _, _, song_id, artist_id, session_id, _, _) = &rows[0];
        assert_eq!(*start_time, 1_000);
        assert_eq!(*session_id, 5);
        assert_eq!(song_id.as_deref(), Some("S1"));
        assert_eq!(artist_id.as_deref(), Some("AR1"));
    }

    #[test]
    fn unmatched_title_keeps_the_play() {
        let conn = warehouse();
        play(&conn, 9, 2_000, 4, "paid", "Unknown Title");
        catalog(&conn, "S1", "Foo", "AR1");

        FactMerger::new(&conn).merge().expect("merge");
        let rows = facts(&conn);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].3, None);
        assert_eq!(rows[0].4, None);
    }

    #[test]
    fn title_match_is_exact() {
        let conn = warehouse();
        play(&conn, 1, 10, 1, "free", "foo ");
        catalog(&conn, "S1", "Foo", "AR1");

        FactMerger::new(&conn).merge().expect("merge");
        assert_eq!(facts(&conn)[0].3, None);
    }

    #[test]
    fn non_play_pages_are_filtered() {
        let conn = warehouse();
        conn.execute(
            "INSERT INTO staging_events (user_id, ts, page, session_id, level) VALUES (1, 10, 'Login', 1, 'free')",
            [],
        )
        .expect("insert");

        let report = FactMerger::new(&conn).merge().expect("merge");
        assert_eq!(report.candidates, 0);
        assert!(facts(&conn).is_empty());
    }

    #[test]
    fn merge_twice_is_idempotent() {
        let conn = warehouse();
        play(&conn, 1, 100, 1, "free", "Foo");
        play(&conn, 1, 200, 1, "free", "Bar");
        play(&conn, 2, 100, 2, "paid", "Foo");
        catalog(&conn, "S1", "Foo", "AR1");

        let merger = FactMerger::new(&conn);
        merger.merge().expect("first merge");
        let first = facts(&conn);

        let second_report = merger.merge().expect("second merge");
        assert_eq!(second_report.evicted, 3);
        assert_eq!(second_report.inserted, 3);
        assert_eq!(facts(&conn), first);
    }

    #[test]
    fn overlapping_keys_take_the_newer_staging_version() {
        let conn = warehouse();
        play(&conn, 1, 100, 1, "free", "Foo");
        play(&conn, 1, 200, 1, "free", "Foo");
        catalog(&conn, "S1", "Foo", "AR1");
        FactMerger::new(&conn).merge().expect("first merge");

        conn.execute_batch("DELETE FROM staging_events").expect("clear");
        play(&conn, 1, 200, 1, "paid", "Foo");
        play(&conn, 3, 300, 7, "free", "Foo");

        let report = FactMerger::new(&conn).merge().expect("second merge");
        assert_eq!(report.evicted, 1);
        assert_eq!(report.fact_rows, 3);

        let rows = facts(&conn);
        let levels: Vec<(i64, i64, &str)> = rows
            .iter()
            .map(|row| (row.5, row.0, row.2.as_str()))
            .collect();
        assert_eq!(levels, vec![(1, 100, "free"), (1, 200, "paid"), (3, 300, "free")]);
    }

    #[test]
    fn duplicate_keys_in_staging_collapse_to_one_row() {
        let conn = warehouse();
        play(&conn, 4, 400, 1, "free", "Foo");
        play(&conn, 4, 400, 1, "paid", "Foo");
        catalog(&conn, "S1", "Foo", "AR1");
        catalog(&conn, "S0", "Foo", "AR0");

        let report = FactMerger::new(&conn).merge().expect("merge");
        assert_eq!(report.candidates, 1);

        let rows = facts(&conn);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].2, "paid");
        assert_eq!(rows[0].3.as_deref(), Some("S0"));
    }

    #[test]
    fn failed_merge_leaves_fact_untouched() {
        let conn = warehouse();
        play(&conn, 1, 100, 1, "free", "Foo");
        FactMerger::new(&conn).merge().expect("first merge");
        let before = facts(&conn);

        // Same key as the committed row, but no user id: eviction succeeds,
        // the insert phase violates NOT NULL.
        conn.execute_batch("DELETE FROM staging_events").expect("clear");
        conn.execute(
            "INSERT INTO staging_events (user_id, ts, page, session_id, level) VALUES (NULL, 100, 'NextSong', 1, 'free')",
            [],
        )
        .expect("insert");

        let err = FactMerger::new(&conn).merge().expect_err("must fail");
        assert_eq!(err.stage(), Stage::MergeSongplays);
        assert_eq!(err.error_code(), ErrorCode::ConstraintViolation);
        assert_eq!(facts(&conn), before);

        let leftover: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM temp.sqlite_master WHERE name = 'songplay_candidates'",
                [],
                |row| row.get(0),
            )
            .expect("temp schema");
        assert_eq!(leftover, 0);
    }

    #[test]
    fn merge_stamps_warehouse_meta() {
        let conn = warehouse();
        FactMerger::new(&conn).merge().expect("empty merge");
        let stamped: i64 = conn
            .query_row("SELECT last_merge_at_us FROM warehouse_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .expect("meta");
        assert!(stamped > 0);
    }
}
