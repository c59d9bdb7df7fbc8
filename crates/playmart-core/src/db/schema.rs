//! Canonical warehouse schema for playmart.
//!
//! Two groups of relations live side by side:
//! - staging (`staging_events`, `staging_songs`): wide, unconstrained landing
//!   tables replaced on every load cycle
//! - analytical (`songplays`, `users`, `songs`, `artists`, `time`): the star
//!   schema; dimensions are rebuilt in full, `songplays` is merged on
//!   `(session_id, start_time)`
//!
//! `warehouse_meta` tracks schema version and the last successful load, build
//! and merge.

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

/// Staging relations, in creation order.
pub const STAGING_TABLES: &[&str] = &[STAGING_EVENTS, STAGING_SONGS];

/// Analytical relations, in creation order.
pub const ANALYTICAL_TABLES: &[&str] = &[SONGPLAYS, USERS, SONGS, ARTISTS, TIME];

/// Staging landing tables. Column order matters: it is the positional order
/// used by JSONPaths mappings.
pub const STAGING_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS staging_events (
    artist TEXT,
    auth TEXT,
    first_name TEXT,
    gender TEXT,
    item_in_session INTEGER,
    last_name TEXT,
    length REAL,
    level TEXT,
    location TEXT,
    method TEXT,
    page TEXT,
    registration REAL,
    session_id INTEGER,
    song TEXT,
    status INTEGER,
    ts INTEGER,
    user_agent TEXT,
    user_id INTEGER
);

CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs INTEGER,
    artist_id TEXT,
    artist_latitude REAL,
    artist_longitude REAL,
    artist_location TEXT,
    artist_name TEXT,
    song_id TEXT,
    title TEXT,
    duration REAL,
    year INTEGER
);
";

/// Star schema. `songplay_id` is only a physical row locator; the natural
/// key is `(session_id, start_time)`.
pub const ANALYTICAL_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS songplays (
    songplay_id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time INTEGER NOT NULL CHECK (typeof(start_time) = 'integer'),
    user_id INTEGER NOT NULL CHECK (typeof(user_id) = 'integer'),
    level TEXT NOT NULL,
    song_id TEXT,
    artist_id TEXT,
    session_id INTEGER NOT NULL CHECK (typeof(session_id) = 'integer'),
    location TEXT,
    user_agent TEXT
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    level TEXT
);

CREATE TABLE IF NOT EXISTS songs (
    song_id TEXT PRIMARY KEY NOT NULL,
    title TEXT,
    artist_id TEXT,
    year INTEGER,
    duration REAL
);

CREATE TABLE IF NOT EXISTS artists (
    artist_id TEXT PRIMARY KEY NOT NULL,
    name TEXT,
    location TEXT,
    latitude REAL,
    longitude REAL
);

CREATE TABLE IF NOT EXISTS time (
    start_time INTEGER PRIMARY KEY,
    hour INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
    day INTEGER NOT NULL CHECK (day BETWEEN 1 AND 31),
    week INTEGER NOT NULL CHECK (week BETWEEN 1 AND 53),
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    year INTEGER NOT NULL,
    weekday INTEGER NOT NULL CHECK (weekday BETWEEN 0 AND 6)
);
";

pub const META_SQL: &str = r"
CREATE TABLE IF NOT EXISTS warehouse_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_load_at_us INTEGER NOT NULL DEFAULT 0,
    last_build_at_us INTEGER NOT NULL DEFAULT 0,
    last_merge_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO warehouse_meta (
    id,
    schema_version,
    last_load_at_us,
    last_build_at_us,
    last_merge_at_us
) VALUES (1, 1, 0, 0, 0);
";

/// Lookup index for the title join used by the fact merge.
pub const STAGING_INDEXES_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_staging_songs_title
    ON staging_songs(title);
";

/// Natural-key uniqueness for the fact plus read-path indexes for the query
/// facade.
pub const ANALYTICAL_INDEXES_SQL: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_songplays_natural_key
    ON songplays(session_id, start_time);

CREATE INDEX IF NOT EXISTS idx_songplays_song
    ON songplays(song_id);

CREATE INDEX IF NOT EXISTS idx_songplays_user
    ON songplays(user_id);
";

/// Migration v1: staging, analytical and metadata tables.
pub const MIGRATION_V1: &[&str] = &[STAGING_TABLES_SQL, ANALYTICAL_TABLES_SQL, META_SQL];

/// Migration v2: natural-key and read-path indexes.
pub const MIGRATION_V2: &[&str] = &[STAGING_INDEXES_SQL, ANALYTICAL_INDEXES_SQL];

/// Indexes expected by the merge and query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_staging_songs_title",
    "idx_songplays_natural_key",
    "idx_songplays_song",
    "idx_songplays_user",
];
