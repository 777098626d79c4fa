//! Client for the Deezer-style music catalog: search, charts, related artists

use std::{collections::HashSet, time::Duration};

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{config::CatalogConfig, domain::track::TrackSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RELATED_ARTISTS: usize = 5;
const TRACKS_PER_ARTIST: usize = 2;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize, Default)]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Debug, Deserialize, Default)]
struct Chart {
    #[serde(default)]
    tracks: Page<CatalogTrack>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CatalogTrack {
    id: Value,
    title: String,
    duration: u32,
    artist: CatalogArtist,
    album: CatalogAlbum,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CatalogArtist {
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CatalogAlbum {
    title: String,
    cover_medium: String,
    cover_xl: String,
}

/// catalog ids are numbers, but strings are accepted as well
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl CatalogTrack {
    fn into_summary(self) -> Option<TrackSummary> {
        Some(TrackSummary {
            id: id_string(&self.id)?,
            title: self.title,
            artist: self.artist.name,
            album: self.album.title,
            cover: self.album.cover_medium,
            cover_xl: self.album.cover_xl,
            duration: self.duration,
        })
    }
}

fn summaries(tracks: Vec<CatalogTrack>) -> Vec<TrackSummary> {
    tracks
        .into_iter()
        .filter_map(CatalogTrack::into_summary)
        .collect()
}

pub struct CatalogClient {
    client: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()?
            .error_for_status()?
            .json()?)
    }

    pub fn search(&self, query: &str) -> Result<Vec<TrackSummary>, CatalogError> {
        let page: Page<CatalogTrack> = self.get("/search", &[("q", query.to_string())])?;
        Ok(summaries(page.data))
    }

    pub fn chart(&self) -> Result<Vec<TrackSummary>, CatalogError> {
        let chart: Chart = self.get("/chart", &[])?;
        Ok(summaries(chart.tracks.data))
    }

    pub fn related_artists(&self, artist_id: &str) -> Result<Vec<String>, CatalogError> {
        let page: Page<CatalogArtist> = self.get(
            &format!("/artist/{}/related", urlencoding::encode(artist_id)),
            &[],
        )?;
        Ok(page.data.iter().filter_map(|a| id_string(&a.id)).collect())
    }

    pub fn top_tracks(
        &self,
        artist_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, CatalogError> {
        let page: Page<CatalogTrack> = self.get(
            &format!("/artist/{}/top", urlencoding::encode(artist_id)),
            &[("limit", limit.to_string())],
        )?;
        Ok(summaries(page.data))
    }

    /// Top tracks of artists related to `artist_id`.
    ///
    /// Failing to load one related artist only skips that artist.
    pub fn recommendations(&self, artist_id: &str) -> Result<Vec<TrackSummary>, CatalogError> {
        let related = self.related_artists(artist_id)?;
        let mut seen = HashSet::new();
        let mut tracks = Vec::new();

        for related_id in related.iter().take(RELATED_ARTISTS) {
            match self.top_tracks(related_id, TRACKS_PER_ARTIST) {
                Ok(top) => tracks.extend(top.into_iter().filter(|t| seen.insert(t.id.clone()))),
                Err(e) => log::warn!("skipping related artist {related_id}: {e}"),
            }
        }
        Ok(tracks)
    }
}
