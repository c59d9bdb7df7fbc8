//! End-to-end runs over on-disk JSON sources: load, build, merge, query.

#[path = "fixtures.rs"]
mod fixtures;

use fixtures::{Workspace, count, fact_rows, page_view, play, song};
use playmart_core::query::{TopSong, TopUser};

#[test]
fn single_play_lands_with_resolved_song() {
    let ws = Workspace::new();
    ws.write_events("2018-11-01-events", &[play(1, 1_000, 5, "Foo", "free")]);
    ws.write_songs("TRAAAAW128F429D538", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    let report = pipeline.run().expect("run");
    assert_eq!(report.staging.events.rows, 1);
    assert_eq!(report.staging.songs.rows, 1);
    assert_eq!(report.merge.inserted, 1);

    let rows = fact_rows(&pipeline);
    assert_eq!(
        rows,
        vec![(
            1_000,
            1,
            "free".to_string(),
            Some("S1".to_string()),
            Some("AR1".to_string()),
            5,
            Some("X".to_string()),
            Some("A".to_string()),
        )]
    );
}

#[test]
fn latest_level_wins_across_files() {
    let ws = Workspace::new();
    ws.write_events("a-late", &[play(42, 200, 1, "Foo", "paid")]);
    ws.write_events("b-early", &[play(42, 100, 2, "Foo", "free")]);
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    pipeline.run().expect("run");

    let level: String = pipeline
        .connection()
        .query_row("SELECT level FROM users WHERE user_id = 42", [], |row| row.get(0))
        .expect("user row");
    assert_eq!(level, "paid");
    assert_eq!(count(&pipeline, "users"), 1);
}

#[test]
fn unknown_title_keeps_play_without_song() {
    let ws = Workspace::new();
    ws.write_events("events", &[play(3, 5_000, 9, "Unknown Title", "free")]);
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    pipeline.run().expect("run");

    let rows = fact_rows(&pipeline);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].3, None);
    assert_eq!(rows[0].4, None);
}

#[test]
fn non_play_pages_never_reach_the_fact() {
    let ws = Workspace::new();
    ws.write_events(
        "events",
        &[
            page_view(3, 10, 1, "Login"),
            page_view(3, 20, 1, "Home"),
            play(3, 30, 1, "Foo", "free"),
        ],
    );
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    let report = pipeline.run().expect("run");

    assert_eq!(report.merge.candidates, 1);
    assert_eq!(count(&pipeline, "songplays"), 1);
    // Time rows come from every event, not only plays.
    assert_eq!(report.dimensions.time, 3);
}

#[test]
fn rerunning_the_job_changes_nothing() {
    let ws = Workspace::new();
    ws.write_events(
        "events",
        &[
            play(1, 100, 1, "Foo", "free"),
            play(2, 200, 2, "Bar", "paid"),
            play(1, 300, 1, "Nope", "free"),
        ],
    );
    ws.write_songs("songs", &[song("S1", "Foo", "AR1"), song("S2", "Bar", "AR2")]);

    let pipeline = ws.pipeline();
    pipeline.run().expect("first run");
    let first_rows = fact_rows(&pipeline);
    let first_summary = pipeline.summary().expect("summary");

    let second = pipeline.run().expect("second run");
    assert_eq!(second.merge.evicted, 3);
    assert_eq!(fact_rows(&pipeline), first_rows);
    assert_eq!(pipeline.summary().expect("summary"), first_summary);
}

#[test]
fn second_batch_replaces_overlapping_keys_only() {
    let ws = Workspace::new();
    ws.write_songs("songs", &[song("S1", "Foo", "AR1"), song("S2", "Bar", "AR2")]);
    ws.write_events(
        "batch-1",
        &[play(1, 100, 1, "Foo", "free"), play(1, 200, 1, "Foo", "free")],
    );

    let pipeline = ws.pipeline();
    pipeline.run().expect("first batch");

    ws.clear_events();
    ws.write_events(
        "batch-2",
        &[play(1, 200, 1, "Bar", "paid"), play(7, 900, 4, "Foo", "free")],
    );
    let report = pipeline.run().expect("second batch");
    assert_eq!(report.merge.evicted, 1);
    assert_eq!(report.merge.fact_rows, 3);

    let rows = fact_rows(&pipeline);
    let keyed: Vec<(i64, i64, &str, Option<&str>)> = rows
        .iter()
        .map(|row| (row.5, row.0, row.2.as_str(), row.3.as_deref()))
        .collect();
    assert_eq!(
        keyed,
        vec![
            (1, 100, "free", Some("S1")),
            (1, 200, "paid", Some("S2")),
            (4, 900, "free", Some("S1")),
        ]
    );

    // Dimensions reflect only the current staging contents.
    assert_eq!(pipeline.get_total_users().expect("users"), 2);
}

#[test]
fn summary_ranks_top_five_with_stable_ties() {
    let ws = Workspace::new();
    let titles = ["A", "B", "C", "D", "E", "F"];
    ws.write_songs(
        "songs",
        &titles
            .iter()
            .map(|title| song(&format!("S{title}"), title, "AR1"))
            .collect::<Vec<_>>(),
    );

    // SF: 3 plays, SA/SB/SC/SD/SE: 1 play each.
    let mut events = vec![
        play(1, 1, 1, "F", "free"),
        play(2, 2, 1, "F", "free"),
        play(3, 3, 1, "F", "free"),
    ];
    for (idx, title) in titles[..5].iter().enumerate() {
        let ts = 10 + i64::try_from(idx).expect("small index");
        events.push(play(4, ts, 2, title, "paid"));
    }
    ws.write_events("events", &events);

    let pipeline = ws.pipeline();
    pipeline.run().expect("run");
    let summary = pipeline.summary().expect("summary");

    assert_eq!(summary.total_users, 4);
    assert_eq!(summary.total_songs, 6);

    let song_ids: Vec<&str> = summary.top_songs.iter().map(|s| s.song_id.as_str()).collect();
    assert_eq!(song_ids, vec!["SF", "SA", "SB", "SC", "SD"]);
    assert_eq!(
        summary.top_songs[0],
        TopSong {
            song_id: "SF".into(),
            title: Some("F".into()),
            play_count: 3,
        }
    );

    assert_eq!(
        summary.top_users[0],
        TopUser {
            user_id: 4,
            first_name: Some("User4".into()),
            last_name: Some("Tester".into()),
            play_count: 5,
        }
    );
    let user_ids: Vec<i64> = summary.top_users.iter().map(|u| u.user_id).collect();
    assert_eq!(user_ids, vec![4, 1, 2, 3]);
}

#[test]
fn file_uris_are_accepted_as_sources() {
    let mut ws = Workspace::new();
    ws.config.sources.song_data = format!("file://{}", ws.song_dir().display());
    ws.write_events("events", &[play(1, 1_000, 5, "Foo", "free")]);
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    let report = pipeline.run().expect("run");
    assert_eq!(report.staging.songs.rows, 1);
    assert_eq!(pipeline.get_total_songs().expect("songs"), 1);
}

#[test]
fn build_and_merge_run_in_either_order() {
    let ws = Workspace::new();
    ws.write_events("events", &[play(1, 1_000, 5, "Foo", "free")]);
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    let pipeline = ws.pipeline();
    pipeline.load_staging().expect("load");
    pipeline.merge_fact().expect("merge first");
    pipeline.build_dimensions().expect("build second");

    let marks = pipeline.stage_marks().expect("marks");
    assert!(marks.last_load_at_us > 0);
    assert!(marks.last_build_at_us > 0);
    assert!(marks.last_merge_at_us > 0);
    assert_eq!(pipeline.get_top_songs(5).expect("top")[0].song_id, "S1");
}

#[test]
fn warehouse_state_survives_reconnect() {
    let ws = Workspace::new();
    ws.write_events("events", &[play(1, 1_000, 5, "Foo", "free")]);
    ws.write_songs("songs", &[song("S1", "Foo", "AR1")]);

    {
        let pipeline = ws.pipeline();
        pipeline.run().expect("run");
    }

    let reopened = ws.pipeline();
    assert_eq!(count(&reopened, "songplays"), 1);
    assert_eq!(reopened.get_total_users().expect("users"), 1);
}
