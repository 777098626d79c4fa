use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_TRACK_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTrackId {
    #[error("track id is empty")]
    Empty,

    #[error("track id is longer than {MAX_TRACK_ID_LEN} characters")]
    TooLong,

    #[error("track id contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Represents the external catalog key of a track.
///
/// It doubles as the cache filename stem, so it only ever holds characters
/// that are safe inside a single path segment: ascii letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn parse(raw: &str) -> Result<Self, InvalidTrackId> {
        if raw.is_empty() {
            return Err(InvalidTrackId::Empty);
        }
        if raw.len() > MAX_TRACK_ID_LEN {
            return Err(InvalidTrackId::TooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(InvalidTrackId::ForbiddenChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TrackId {
    type Err = InvalidTrackId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Track as seen by playback and caching: catalog id plus what is needed to look it up elsewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: TrackId,
    pub artist: String,
    pub title: String,
}

impl TrackRef {
    pub fn new(id: &str, artist: &str, title: &str) -> Result<Self, InvalidTrackId> {
        Ok(Self {
            id: TrackId::parse(id)?,
            artist: artist.trim().to_string(),
            title: title.trim().to_string(),
        })
    }

    /// free-text query used against the video platform
    pub fn search_query(&self) -> String {
        format!("{} - {} audio", self.artist, self.title)
    }
}

/// Track as returned by catalog lookups and stored in likes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub cover_xl: String,
    #[serde(default)]
    pub duration: u32,
}
