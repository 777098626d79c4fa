use anyhow::anyhow;
use log::info;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};

use crate::{
    config::HttpConfig,
    context::AppContext,
    domain::track::{TrackId, TrackRef, TrackSummary},
    downloads::SubmitOutcome,
    http::{
        auth::session_token,
        error::ApiError,
        stream::{serve_cached, serve_proxy},
    },
    playback::PlaybackSource,
};

pub struct HttpServer {
    ctx: AppContext,
    pub config: HttpConfig,
}

#[derive(Serialize, Deserialize)]
struct PlayResponse {
    source: String,
    url: String,
}

#[derive(Deserialize)]
struct CacheSongRequest {
    id: String,
    artist: String,
    title: String,
}

#[derive(Serialize, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Serialize, Deserialize)]
struct CacheStatusResponse {
    id: String,
    cached: bool,
    pending: bool,
}

#[derive(Serialize, Deserialize)]
struct LyricsResponse {
    lyrics: String,
}

#[derive(Serialize, Deserialize)]
struct UnlikeResponse {
    removed: bool,
}

impl HttpServer {
    pub fn new(ctx: AppContext, config: HttpConfig) -> Self {
        Self { ctx, config }
    }

    /// Serves until the process is stopped.
    pub fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        let threads = self.config.threads;
        let server = rouille::Server::new(&addr, move |request| self.handle_request(request))
            .map_err(|e| anyhow!("Failed to bind {addr}: {e}"))?;
        let server = match threads {
            Some(threads) => server.pool_size(threads),
            None => server,
        };
        server.run();
        Ok(())
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (GET) (/play) => {
                self.json_route(request, |_| self.play(request))
            },
            (POST) (/cache_song) => {
                self.json_route(request, |_| self.cache_song(request))
            },
            (GET) (/cache_status) => {
                self.json_route(request, |_| self.cache_status(request))
            },
            (GET) (/stream_cache/{file_name: String}) => {
                self.stream_route(request, || {
                    serve_cached(&self.ctx.cache, &file_name, request.header("Range"))
                })
            },
            (GET) (/stream_proxy) => {
                self.stream_route(request, || {
                    let url = request
                        .get_param("url")
                        .filter(|url| !url.is_empty())
                        .ok_or_else(|| ApiError::BadRequest("No URL provided".into()))?;
                    serve_proxy(&self.ctx.http_client, &url, request.header("Range"))
                })
            },
            (GET) (/search) => {
                self.json_route(request, |_| self.search(request))
            },
            (GET) (/chart) => {
                self.json_route(request, |_| Ok(self.chart()))
            },
            (GET) (/recommendations) => {
                self.json_route(request, |_| self.recommendations(request))
            },
            (GET) (/lyrics) => {
                self.json_route(request, |_| self.lyrics(request))
            },
            (GET) (/likes) => {
                self.json_route(request, |user| Ok(self.ctx.storage()?.list_likes(user)?))
            },
            (POST) (/likes) => {
                self.json_route(request, |user| self.like(request, user))
            },
            (DELETE) (/likes/{id: String}) => {
                self.json_route(request, |user| {
                    let removed = self.ctx.storage()?.unlike(user, &id)?;
                    Ok(UnlikeResponse { removed })
                })
            },
            _ => Response::empty_404()
        );

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    /// name of the user owning the request's session
    fn authenticate(&self, request: &Request) -> Result<String, ApiError> {
        let token = session_token(request).ok_or(ApiError::Unauthorized)?;
        self.ctx
            .storage()?
            .session_user(&token)?
            .ok_or(ApiError::Unauthorized)
    }

    fn json_route<T, F>(&self, request: &Request, handler: F) -> Response
    where
        T: Serialize,
        F: FnOnce(&str) -> Result<T, ApiError>,
    {
        match self.authenticate(request).and_then(|user| handler(&user)) {
            Ok(body) => Response::json(&body),
            Err(e) => e.into_response(),
        }
    }

    /// audio routes answer errors in plain text, never with audio bytes
    fn stream_route<F>(&self, request: &Request, handler: F) -> Response
    where
        F: FnOnce() -> Result<Response, ApiError>,
    {
        match self.authenticate(request).and_then(|_| handler()) {
            Ok(response) => response,
            Err(e) => e.into_text_response(),
        }
    }

    fn play(&self, request: &Request) -> Result<PlayResponse, ApiError> {
        let track = track_from_params(request)?;

        Ok(match self.ctx.playback.resolve(&track)? {
            PlaybackSource::Local { .. } => PlayResponse {
                source: "local".into(),
                url: format!("/stream_cache/{}", self.ctx.cache.file_name(&track.id)),
            },
            PlaybackSource::Remote { url } => PlayResponse {
                source: "remote".into(),
                url: format!("/stream_proxy?url={}", urlencoding::encode(&url)),
            },
        })
    }

    fn cache_song(&self, request: &Request) -> Result<StatusResponse, ApiError> {
        let body: CacheSongRequest = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
        let track = TrackRef::new(&body.id, &body.artist, &body.title)?;
        if track.artist.is_empty() || track.title.is_empty() {
            return Err(ApiError::BadRequest("artist and title are required".into()));
        }

        match self.ctx.downloads.submit(track) {
            SubmitOutcome::Queued | SubmitOutcome::AlreadyPending => Ok(StatusResponse {
                status: "queued".into(),
            }),
            SubmitOutcome::Closed => Err(ApiError::Internal("download queue is closed".into())),
        }
    }

    fn cache_status(&self, request: &Request) -> Result<CacheStatusResponse, ApiError> {
        let id = TrackId::parse(&required_param(request, "id")?)?;
        Ok(CacheStatusResponse {
            cached: self.ctx.cache.exists(&id),
            pending: self.ctx.downloads.is_pending(&id),
            id: id.to_string(),
        })
    }

    /// an empty or missing query finds nothing
    fn search(&self, request: &Request) -> Result<Vec<TrackSummary>, ApiError> {
        let Some(query) = request.get_param("q").filter(|q| !q.trim().is_empty()) else {
            return Ok(Vec::new());
        };
        Ok(self.ctx.catalog.search(&query).unwrap_or_else(|e| {
            log::warn!("catalog search for {query:?} failed: {e}");
            Vec::new()
        }))
    }

    fn chart(&self) -> Vec<TrackSummary> {
        self.ctx.catalog.chart().unwrap_or_else(|e| {
            log::warn!("catalog chart failed: {e}");
            Vec::new()
        })
    }

    fn recommendations(&self, request: &Request) -> Result<Vec<TrackSummary>, ApiError> {
        let artist_id = required_param(request, "artist_id")?;
        Ok(self
            .ctx
            .catalog
            .recommendations(&artist_id)
            .unwrap_or_else(|e| {
                log::warn!("recommendations for artist {artist_id} failed: {e}");
                Vec::new()
            }))
    }

    fn lyrics(&self, request: &Request) -> Result<LyricsResponse, ApiError> {
        let artist = required_param(request, "artist")?;
        let title = required_param(request, "title")?;
        match self.ctx.lyrics.fetch(&artist, &title) {
            Ok(Some(lyrics)) => Ok(LyricsResponse { lyrics }),
            Ok(None) => Err(ApiError::NotFound("Lyrics not found".into())),
            Err(e) => {
                log::warn!("lyrics lookup for {artist} - {title} failed: {e}");
                Err(ApiError::NotFound("Lyrics not found".into()))
            }
        }
    }

    fn like(&self, request: &Request, user: &str) -> Result<StatusResponse, ApiError> {
        let track: TrackSummary = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
        TrackId::parse(&track.id)?;
        self.ctx.storage()?.like(user, &track)?;
        Ok(StatusResponse {
            status: "liked".into(),
        })
    }
}

fn required_param(request: &Request, name: &str) -> Result<String, ApiError> {
    request
        .get_param(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing parameter {name}")))
}

fn track_from_params(request: &Request) -> Result<TrackRef, ApiError> {
    let id = required_param(request, "id")?;
    let artist = required_param(request, "artist")?;
    let title = required_param(request, "title")?;
    Ok(TrackRef::new(&id, &artist, &title)?)
}
