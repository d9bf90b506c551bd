//! Shared fixtures for integration tests: a small Chinook database, a config
//! file pointing at it, and an `AppContext` wired to a scripted model.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use askdb::config::{self, Config, Overrides};
use askdb::context::AppContext;
use askdb::db::Database;
use askdb::llm::LlmProvider;
use askdb::llm::providers::dummy::DummyProvider;
use askdb::llm::providers::scripted::ScriptedProvider;

const CHINOOK_SQL: &str = "
CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name NVARCHAR(120));
CREATE TABLE Album (AlbumId INTEGER PRIMARY KEY, Title NVARCHAR(160) NOT NULL, ArtistId INTEGER NOT NULL);
CREATE TABLE PlaylistTrack (PlaylistId INTEGER NOT NULL, TrackId INTEGER NOT NULL, PRIMARY KEY (PlaylistId, TrackId));
INSERT INTO Artist VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith'), (5, 'Alice In Chains'), (22, 'Led Zeppelin');
INSERT INTO Album VALUES
    (1, 'For Those About To Rock We Salute You', 1),
    (2, 'Balls to the Wall', 2),
    (4, 'Let There Be Rock', 1),
    (5, 'Big Ones', 3),
    (7, 'Facelift', 5),
    (8, 'Chronicle, Vol. 1', 22),
    (9, 'Chronicle, Vol. 2', 22);
INSERT INTO PlaylistTrack VALUES (1, 3402), (1, 3389), (8, 3402);
";

/// Write `dir/chinook.sqlite`; returns its `sqlite:///` uri.
pub fn chinook(dir: &Path) -> String {
    let path = dir.join("chinook.sqlite");
    let conn = Connection::open(&path).expect("create chinook");
    conn.execute_batch(CHINOOK_SQL).expect("load chinook");
    format!("sqlite:///{}", path.display())
}

/// Config rooted at `dir` with dummy providers.
pub fn config(dir: &Path, lookup: bool, checkpoints: bool) -> Config {
    let uri = chinook(dir);
    let toml = format!(
        r#"
[app]
work_dir = "{work}"
log_level = "debug"
prompts_dir = "{work}/prompts"

[database]
uri = "{uri}"

[agent]
max_steps = 8

[lookup]
enabled = {lookup}

[checkpoint]
enabled = {checkpoints}
"#,
        work = dir.display(),
    );
    let path = dir.join("askdb.toml");
    fs::write(&path, toml).expect("write config");
    config::load_from(&path, &Overrides::default()).expect("load config")
}

/// Context whose chat model replays `llm`; embeddings use the dummy provider.
pub async fn context(dir: &Path, llm: &ScriptedProvider, lookup: bool, checkpoints: bool) -> AppContext {
    let config = config(dir, lookup, checkpoints);
    let db = Arc::new(Database::open(&config.database).expect("open db"));
    AppContext::assemble(
        config,
        db,
        LlmProvider::Scripted(llm.clone()),
        LlmProvider::Dummy(DummyProvider),
    )
    .await
    .expect("assemble context")
}
