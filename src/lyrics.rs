//! Synced lyrics lookup against an LRCLIB-style API.
//!
//! Catalog metadata and lyrics databases rarely agree on exact names, so
//! the lookup goes through three searches, stopping at the first hit:
//! 1. artist and title as given
//! 2. artist and the title without `(...)` / `[...]` qualifiers
//! 3. the cleaned title alone, keeping results whose artist loosely matches

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::LyricsConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static QUALIFIERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid regex"));

#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("lyrics request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LyricsRecord {
    pub synced_lyrics: Option<String>,
    pub plain_lyrics: Option<String>,
    pub artist_name: String,
}

/// "Song (Remastered 2011) [feat. X]" -> "Song"
pub fn clean_title(title: &str) -> String {
    let cleaned = QUALIFIERS.replace_all(title, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// case-insensitive containment in either direction
pub fn artist_matches(wanted: &str, found: &str) -> bool {
    let (wanted, found) = (wanted.trim().to_lowercase(), found.trim().to_lowercase());
    if wanted.is_empty() || found.is_empty() {
        return false;
    }
    found.contains(&wanted) || wanted.contains(&found)
}

fn first_synced<'a>(
    records: impl IntoIterator<Item = &'a LyricsRecord>,
) -> Option<String> {
    records
        .into_iter()
        .filter_map(|r| r.synced_lyrics.as_ref())
        .find(|lyrics| !lyrics.trim().is_empty())
        .cloned()
}

pub struct LyricsClient {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl LyricsClient {
    pub fn new(config: &LyricsConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Anything other than a list of records counts as no results.
    fn search(&self, query: &[(&str, &str)]) -> Result<Vec<LyricsRecord>, LyricsError> {
        let body: serde_json::Value = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(query)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(REQUEST_TIMEOUT)
            .send()?
            .error_for_status()?
            .json()?;

        let serde_json::Value::Array(items) = body else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    pub fn fetch(&self, artist: &str, title: &str) -> Result<Option<String>, LyricsError> {
        let exact = self.search(&[("artist_name", artist), ("track_name", title)])?;
        if let Some(lyrics) = first_synced(&exact) {
            return Ok(Some(lyrics));
        }

        let cleaned = clean_title(title);
        if cleaned != title {
            let records = self.search(&[("artist_name", artist), ("track_name", cleaned.as_str())])?;
            if let Some(lyrics) = first_synced(&records) {
                log::debug!("lyrics for {artist} - {title} found with cleaned title");
                return Ok(Some(lyrics));
            }
        }

        let records = self.search(&[("q", cleaned.as_str())])?;
        let lyrics = first_synced(
            records
                .iter()
                .filter(|r| artist_matches(artist, &r.artist_name)),
        );
        if lyrics.is_some() {
            log::debug!("lyrics for {artist} - {title} found by title search");
        }
        Ok(lyrics)
    }
}
