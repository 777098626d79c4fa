use rusqlite::Connection;

pub mod tables {
    pub const SESSIONS: &str = "sessions";
    pub const LIKES: &str = "likes";

    pub const ALL_TABLES: &[&str] = &[SESSIONS, LIKES];
}

pub mod columns {
    pub const TOKEN_HASH: &str = "token_hash";
    pub const USER: &str = "user";
    pub const CREATED_AT: &str = "created_at";
    pub const TRACK_ID: &str = "track_id";
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const COVER: &str = "cover";
    pub const LIKED_AT: &str = "liked_at";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS likes (
    user TEXT NOT NULL,
    track_id TEXT NOT NULL,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    album TEXT NOT NULL DEFAULT '',
    cover TEXT NOT NULL DEFAULT '',
    liked_at INTEGER NOT NULL,
    PRIMARY KEY (user, track_id)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
