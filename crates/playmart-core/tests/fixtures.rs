//! Shared on-disk fixtures: a temp workspace with a warehouse file, event and
//! song directories, and the JSONPaths file for camelCase event logs.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use playmart_core::{Pipeline, PipelineConfig};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const LOG_JSONPATHS: &[&str] = &[
    "$['artist']",
    "$['auth']",
    "$['firstName']",
    "$['gender']",
    "$['itemInSession']",
    "$['lastName']",
    "$['length']",
    "$['level']",
    "$['location']",
    "$['method']",
    "$['page']",
    "$['registration']",
    "$['sessionId']",
    "$['song']",
    "$['status']",
    "$['ts']",
    "$['userAgent']",
    "$['userId']",
];

pub struct Workspace {
    pub dir: TempDir,
    pub config: PipelineConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("log_data")).expect("log dir");
        fs::create_dir_all(root.join("song_data")).expect("song dir");

        let jsonpaths = root.join("log_json_path.json");
        fs::write(&jsonpaths, json!({ "jsonpaths": LOG_JSONPATHS }).to_string())
            .expect("write jsonpaths");

        let mut config = PipelineConfig::default();
        config.warehouse.path = root.join("warehouse.sqlite3");
        config.warehouse.connect_interval_ms = 1;
        config.sources.log_data = root.join("log_data").display().to_string();
        config.sources.song_data = root.join("song_data").display().to_string();
        config.sources.log_jsonpath = Some(jsonpaths);

        Self { dir, config }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("log_data")
    }

    pub fn song_dir(&self) -> PathBuf {
        self.dir.path().join("song_data")
    }

    /// Write `records` as JSON lines to `log_data/<name>.json`.
    pub fn write_events(&self, name: &str, records: &[Value]) {
        write_lines(&self.log_dir().join(format!("{name}.json")), records);
    }

    /// Write `records` as concatenated objects to `song_data/<name>.json`.
    pub fn write_songs(&self, name: &str, records: &[Value]) {
        let body: String = records.iter().map(Value::to_string).collect();
        fs::write(self.song_dir().join(format!("{name}.json")), body).expect("write songs");
    }

    pub fn write_raw_event_file(&self, name: &str, body: &str) {
        fs::write(self.log_dir().join(name), body).expect("write raw events");
    }

    pub fn clear_events(&self) {
        fs::remove_dir_all(self.log_dir()).expect("remove log dir");
        fs::create_dir_all(self.log_dir()).expect("recreate log dir");
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::connect(self.config.clone()).expect("connect pipeline")
    }
}

fn write_lines(path: &PathBuf, records: &[Value]) {
    let body: String = records.iter().map(|record| format!("{record}\n")).collect();
    fs::write(path, body).expect("write events");
}

/// A `NextSong` log line in the raw camelCase shape.
pub fn play(user_id: i64, ts: i64, session_id: i64, song: &str, level: &str) -> Value {
    json!({
        "artist": "Some Artist",
        "auth": "Logged In",
        "firstName": format!("User{user_id}"),
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Tester",
        "length": 200.0,
        "level": level,
        "location": "X",
        "method": "PUT",
        "page": "NextSong",
        "registration": 1_540_000_000_000.0,
        "sessionId": session_id,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "A",
        "userId": user_id.to_string(),
    })
}

/// A non-play log line such as `Login` or `Home`.
pub fn page_view(user_id: i64, ts: i64, session_id: i64, page: &str) -> Value {
    let mut event = play(user_id, ts, session_id, "", "free");
    event["page"] = json!(page);
    event["song"] = Value::Null;
    event
}

pub fn song(song_id: &str, title: &str, artist_id: &str) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": format!("Artist {artist_id}"),
        "song_id": song_id,
        "title": title,
        "duration": 180.5,
        "year": 2004,
    })
}

pub type FactRow = (i64, i64, String, Option<String>, Option<String>, i64, Option<String>, Option<String>);

/// Natural columns of every fact row, ordered by key.
pub fn fact_rows(pipeline: &Pipeline) -> Vec<FactRow> {
    let mut stmt = pipeline
        .connection()
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

pub fn count(pipeline: &Pipeline, table: &str) -> i64 {
    pipeline
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count")
}
