use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{
    config,
    domain::{
        hash::{TokenHash, new_token},
        track::TrackSummary,
    },
    storage::{
        db::{self, SecondsSinceUnix, now_secs},
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use tables::*;

/// Main structure that implements all persistence: sessions and likes
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikedTrack {
    #[serde(flatten)]
    pub track: TrackSummary,
    pub liked_at: SecondsSinceUnix,
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(db_config: &config::Database) -> Result<Self, StorageError> {
        let db: rusqlite::Connection = db::open(db_config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    /// Creates a session for `user` and returns its token.
    ///
    /// The token is only known to the caller, the database keeps its hash.
    pub fn create_session(&mut self, user: &str) -> Result<String, StorageError> {
        let token = new_token();
        self.db.execute(
            &format!("INSERT INTO {SESSIONS} ({TOKEN_HASH}, {USER}, {CREATED_AT}) VALUES (?1, ?2, ?3)"),
            params![TokenHash::of(&token).to_hex(), user, now_secs()],
        )?;
        Ok(token)
    }

    /// user owning the session, if the token is known
    pub fn session_user(&self, token: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!("SELECT {USER} FROM {SESSIONS} WHERE {TOKEN_HASH} = ?1"),
                params![TokenHash::of(token).to_hex()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// returns true if a session was removed
    pub fn revoke_session(&mut self, token: &str) -> Result<bool, StorageError> {
        let removed = self.db.execute(
            &format!("DELETE FROM {SESSIONS} WHERE {TOKEN_HASH} = ?1"),
            params![TokenHash::of(token).to_hex()],
        )?;
        Ok(removed > 0)
    }

    /// Likes are idempotent: liking twice keeps the first like time
    pub fn like(&mut self, user: &str, track: &TrackSummary) -> Result<(), StorageError> {
        self.db.execute(
            &format!(
                "INSERT OR IGNORE INTO {LIKES}
                 ({USER}, {TRACK_ID}, {TITLE}, {ARTIST}, {ALBUM}, {COVER}, {LIKED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                user,
                track.id,
                track.title,
                track.artist,
                track.album,
                track.cover,
                now_secs()
            ],
        )?;
        Ok(())
    }

    /// returns true if the track was liked before
    pub fn unlike(&mut self, user: &str, track_id: &str) -> Result<bool, StorageError> {
        let removed = self.db.execute(
            &format!("DELETE FROM {LIKES} WHERE {USER} = ?1 AND {TRACK_ID} = ?2"),
            params![user, track_id],
        )?;
        Ok(removed > 0)
    }

    /// newest first
    pub fn list_likes(&self, user: &str) -> Result<Vec<LikedTrack>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {TRACK_ID}, {TITLE}, {ARTIST}, {ALBUM}, {COVER}, {LIKED_AT}
             FROM {LIKES} WHERE {USER} = ?1
             ORDER BY {LIKED_AT} DESC, rowid DESC"
        ))?;

        let likes = stmt
            .query_map(params![user], |row| {
                Ok(LikedTrack {
                    track: TrackSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        artist: row.get(2)?,
                        album: row.get(3)?,
                        cover: row.get(4)?,
                        ..Default::default()
                    },
                    liked_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(likes)
    }
}
