use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::{
    cache::CacheStore,
    domain::track::TrackRef,
    resolver::{AudioResolver, ResolveError},
};

/// Where the audio of a track can be played from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Local { path: PathBuf },
    Remote { url: String },
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no playable audio found for {artist} - {title}")]
    NotFound { artist: String, title: String },

    #[error("resolver failed: {0}")]
    Upstream(#[from] ResolveError),
}

/// Decides between the local cache and the external resolver.
///
/// Nothing is remembered between calls: the cache is checked on every call since
/// a background download may have completed in between. Never writes to the cache.
pub struct PlaybackResolver {
    cache: Arc<CacheStore>,
    resolver: Arc<dyn AudioResolver>,
}

impl PlaybackResolver {
    pub fn new(cache: Arc<CacheStore>, resolver: Arc<dyn AudioResolver>) -> Self {
        Self { cache, resolver }
    }

    pub fn resolve(&self, track: &TrackRef) -> Result<PlaybackSource, PlaybackError> {
        if self.cache.exists(&track.id) {
            log::debug!("cache hit for {}", track.id);
            return Ok(PlaybackSource::Local {
                path: self.cache.path_for(&track.id),
            });
        }

        log::debug!("cache miss for {}, asking resolver", track.id);
        match self.resolver.resolve_audio_url(&track.search_query())? {
            Some(url) => Ok(PlaybackSource::Remote { url }),
            None => Err(PlaybackError::NotFound {
                artist: track.artist.clone(),
                title: track.title.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::resolver::stub::ResolverStub;

    const QUERY: &str = "Artist - Title audio";

    fn setup(tmp: &TempDir, stub: ResolverStub) -> (Arc<CacheStore>, Arc<ResolverStub>, PlaybackResolver) {
        let cache = Arc::new(CacheStore::new(tmp.path(), "m4a"));
        let stub = Arc::new(stub);
        let resolver = PlaybackResolver::new(Arc::clone(&cache), stub.clone());
        (cache, stub, resolver)
    }

    fn track() -> TrackRef {
        TrackRef::new("42", "Artist", "Title").unwrap()
    }

    #[test]
    fn cached_track_plays_locally_without_resolver() {
        let tmp = TempDir::new().unwrap();
        let (cache, stub, resolver) =
            setup(&tmp, ResolverStub::with_url(QUERY, "https://cdn.example/a"));
        fs::write(cache.path_for(&track().id), b"audio").unwrap();

        let source = resolver.resolve(&track()).unwrap();

        assert_eq!(
            source,
            PlaybackSource::Local {
                path: tmp.path().join("42.m4a")
            }
        );
        assert_eq!(stub.url_calls(), 0);
    }

    #[test]
    fn miss_asks_resolver_once() {
        let tmp = TempDir::new().unwrap();
        let (_, stub, resolver) =
            setup(&tmp, ResolverStub::with_url(QUERY, "https://cdn.example/a"));

        let source = resolver.resolve(&track()).unwrap();

        assert_eq!(
            source,
            PlaybackSource::Remote {
                url: "https://cdn.example/a".to_string()
            }
        );
        assert_eq!(stub.url_calls(), 1);
    }

    #[test]
    fn miss_without_result_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let (_, stub, resolver) = setup(&tmp, ResolverStub::default());

        let err = resolver.resolve(&track()).unwrap_err();

        assert!(matches!(err, PlaybackError::NotFound { .. }));
        assert_eq!(stub.url_calls(), 1);
    }

    #[test]
    fn resolver_failure_is_upstream_error() {
        let tmp = TempDir::new().unwrap();
        let (_, stub, resolver) = setup(&tmp, ResolverStub::failing());

        let err = resolver.resolve(&track()).unwrap_err();

        assert!(matches!(err, PlaybackError::Upstream(_)));
        assert_eq!(stub.url_calls(), 1);
    }

    #[test]
    fn decision_is_rechecked_every_call() {
        let tmp = TempDir::new().unwrap();
        let (cache, stub, resolver) =
            setup(&tmp, ResolverStub::with_url(QUERY, "https://cdn.example/a"));

        assert!(matches!(
            resolver.resolve(&track()),
            Ok(PlaybackSource::Remote { .. })
        ));
        cache
            .write_stream(&track().id, &mut b"audio".as_slice())
            .unwrap();
        assert!(matches!(
            resolver.resolve(&track()),
            Ok(PlaybackSource::Local { .. })
        ));
        assert_eq!(stub.url_calls(), 1);
    }
}
