//! Audio responses, from the local cache or relayed from an upstream URL.
//!
//! Bodies are readers pulled by the server as it writes to the socket. When
//! the client goes away the write fails and the response is dropped, which
//! closes the cached file or the upstream connection with it.

use std::{io::BufReader, path::Path};

use reqwest::{
    StatusCode, Url,
    blocking::Client,
    header::{ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, HeaderName, RANGE},
};
use rouille::{Response, ResponseBody};

use crate::{cache::CacheStore, http::error::ApiError, range::parse_range_header};

/// read size when relaying an upstream body
pub const PROXY_CHUNK_SIZE: usize = 8 * 1024;

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Map file extension (without dot) to proper MIME type for browser playback.
/// Returns None if the extension is not recognized.
pub fn mime_from_ext(ext: &str) -> Option<String> {
    match ext {
        "m4a" => Some("audio/x-m4a".to_string()), // Safari iOS compatible
        "aac" => Some("audio/aac".to_string()),
        "mp3" => Some("audio/mpeg".to_string()),
        "wav" => Some("audio/wav".to_string()),
        "ogg" | "opus" => Some("audio/ogg".to_string()),
        "webm" => Some("audio/webm".to_string()),
        "flac" => Some("audio/flac".to_string()),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy())
        .map(|s| s.to_lowercase());
    let default = || {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    };
    ext.and_then(|ext| mime_from_ext(ext.as_str()))
        .unwrap_or_else(default)
}

/// Serves `<id>.<ext>` from the cache, honoring a single byte range.
pub fn serve_cached(
    cache: &CacheStore,
    file_name: &str,
    range_header: Option<&str>,
) -> Result<Response, ApiError> {
    let id = cache.id_from_file_name(file_name)?;
    let range = range_header.and_then(parse_range_header);
    let audio = cache.open_for_read(&id, range)?;

    let mime = mime_for_path(&audio.path);
    let len = audio.len();
    let span = audio.span;
    let total = audio.total;
    let len = usize::try_from(len)
        .map_err(|_| ApiError::Internal("cached file too large".into()))?;

    let response = Response {
        status_code: 200,
        headers: vec![("Content-Type".into(), mime.into())],
        data: ResponseBody::from_reader_and_size(audio.body, len),
        upgrade: None,
    }
    .with_unique_header("Accept-Ranges", "bytes");

    Ok(match span {
        Some(span) => {
            log::debug!("STREAM {id} -> 206 {}", span.content_range(total));
            response
                .with_status_code(206)
                .with_unique_header("Content-Range", span.content_range(total))
        }
        None => {
            log::debug!("STREAM {id} -> 200, {total} bytes");
            response
        }
    })
}

/// Relays `url`, forwarding the client's `Range` header as is.
///
/// The body is streamed with chunked framing, so upstream framing headers are
/// not copied. No compression is negotiated with the upstream, the bytes
/// relayed are the bytes of the resource.
pub fn serve_proxy(
    client: &Client,
    raw_url: &str,
    range_header: Option<&str>,
) -> Result<Response, ApiError> {
    let url = Url::parse(raw_url).map_err(|e| ApiError::BadRequest(format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(format!(
            "unsupported url scheme {}",
            url.scheme()
        )));
    }

    let mut request = client.get(url);
    if let Some(range) = range_header {
        request = request.header(RANGE, range);
    }
    let upstream = request.send().map_err(|e| {
        log::warn!("upstream request failed: {e}");
        ApiError::Upstream("upstream request failed".into())
    })?;

    let status = upstream.status();
    if !(status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE) {
        log::warn!("upstream answered {status}");
        return Err(ApiError::Upstream(format!("upstream answered {}", status.as_u16())));
    }

    let header = |name: HeaderName| {
        upstream
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header(CONTENT_TYPE).unwrap_or_else(|| DEFAULT_AUDIO_TYPE.to_string());
    let accept_ranges = header(ACCEPT_RANGES).unwrap_or_else(|| "bytes".to_string());
    let content_range = header(CONTENT_RANGE);

    let mut response = Response {
        status_code: status.as_u16(),
        headers: vec![
            ("Content-Type".into(), content_type.into()),
            ("Accept-Ranges".into(), accept_ranges.into()),
        ],
        data: ResponseBody::from_reader(BufReader::with_capacity(PROXY_CHUNK_SIZE, upstream)),
        upgrade: None,
    };
    if let Some(content_range) = content_range {
        response = response.with_unique_header("Content-Range", content_range);
    }
    log::debug!("PROXY -> {}", status.as_u16());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::Read,
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use rouille::Response;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        domain::track::TrackId,
        context::http_client_with_read_timeout,
        test_support::{Upstream, header, read_body, stalling_upstream, unreachable_base_url},
    };

    fn audio_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn cache_with_file(tmp: &TempDir, len: usize) -> CacheStore {
        let cache = CacheStore::new(tmp.path(), "m4a");
        fs::write(cache.path_for(&TrackId::parse("42").unwrap()), audio_bytes(len)).unwrap();
        cache
    }

    #[test]
    fn whole_file_without_range() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 1000);

        let response = serve_cached(&cache, "42.m4a", None).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        assert_eq!(header(&response, "Content-Type"), Some("audio/x-m4a"));
        assert_eq!(header(&response, "Content-Range"), None);
        let (mut reader, size) = response.data.into_reader_and_size();
        assert_eq!(size, Some(1000));
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, audio_bytes(1000));
    }

    #[test]
    fn first_hundred_bytes() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 1000);

        let response = serve_cached(&cache, "42.m4a", Some("bytes=0-99")).unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Range"), Some("bytes 0-99/1000"));
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        let body = read_body(response);
        assert_eq!(body.len(), 100);
        assert_eq!(body, &audio_bytes(1000)[..100]);
    }

    #[test]
    fn open_ended_range() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 1000);

        let response = serve_cached(&cache, "42.m4a", Some("bytes=900-")).unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Range"), Some("bytes 900-999/1000"));
        assert_eq!(read_body(response), &audio_bytes(1000)[900..]);
    }

    #[test]
    fn range_past_end_is_416() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 1000);

        let err = serve_cached(&cache, "42.m4a", Some("bytes=2000-")).unwrap_err();

        assert!(matches!(err, ApiError::RangeNotSatisfiable { total: 1000 }));
        assert_eq!(err.into_text_response().status_code, 416);
    }

    #[test]
    fn malformed_range_serves_whole_file() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 1000);

        let response = serve_cached(&cache, "42.m4a", Some("bytes=0-1,5-9")).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(read_body(response).len(), 1000);
    }

    #[test]
    fn unsafe_file_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with_file(&tmp, 10);

        for name in ["../42.m4a", "..%2F42.m4a", "42.txt", "a/42.m4a", "..m4a"] {
            let err = serve_cached(&cache, name, None).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{name} accepted");
        }
    }

    #[test]
    fn missing_entry_is_404() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path(), "m4a");

        let err = serve_cached(&cache, "7.m4a", None).unwrap_err();

        assert_eq!(err.status_code(), 404);
    }

    /// serves 1000 bytes, honoring `bytes=N-`, and records the Range it saw
    fn ranged_upstream(seen: Arc<Mutex<Option<String>>>) -> Upstream {
        Upstream::start(move |request| {
            let range = request.header("Range").map(str::to_string);
            *seen.lock().unwrap() = range.clone();
            let data = audio_bytes(1000);
            match range.as_deref().and_then(|r| r.strip_prefix("bytes=")) {
                Some(spec) => {
                    let start: usize = spec.trim_end_matches('-').parse().unwrap();
                    Response::from_data("audio/webm", data[start..].to_vec())
                        .with_status_code(206)
                        .with_unique_header("Content-Range", format!("bytes {start}-999/1000"))
                        .with_unique_header("Accept-Ranges", "bytes")
                }
                None => Response::from_data("audio/webm", data),
            }
        })
    }

    #[test]
    fn proxy_forwards_range_and_relays_partial_content() {
        let seen = Arc::new(Mutex::new(None));
        let upstream = ranged_upstream(Arc::clone(&seen));
        let url = format!("{}/audio", upstream.base_url);

        let response = serve_proxy(&Client::new(), &url, Some("bytes=500-")).unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("bytes=500-"));
        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Type"), Some("audio/webm"));
        assert_eq!(header(&response, "Content-Range"), Some("bytes 500-999/1000"));
        assert_eq!(header(&response, "Content-Length"), None);
        assert_eq!(header(&response, "Transfer-Encoding"), None);
        assert_eq!(header(&response, "Connection"), None);

        // streamed, not buffered up front
        let (mut reader, size) = response.data.into_reader_and_size();
        assert_eq!(size, None);
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, &audio_bytes(1000)[500..]);
    }

    #[test]
    fn proxy_without_range_relays_full_body() {
        let seen = Arc::new(Mutex::new(Some("unset".to_string())));
        let upstream = ranged_upstream(Arc::clone(&seen));

        let response =
            serve_proxy(&Client::new(), &format!("{}/audio", upstream.base_url), None).unwrap();

        assert_eq!(*seen.lock().unwrap(), None);
        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        assert_eq!(read_body(response).len(), 1000);
    }

    #[test]
    fn proxy_rejects_bad_urls() {
        let client = Client::new();

        assert!(matches!(
            serve_proxy(&client, "not a url", None),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            serve_proxy(&client, "file:///etc/passwd", None),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn proxy_upstream_down_is_502() {
        let url = format!("{}/audio", unreachable_base_url());

        let err = serve_proxy(&Client::new(), &url, None).unwrap_err();

        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn proxy_upstream_error_status_is_502() {
        let upstream = Upstream::start(|_| Response::text("expired").with_status_code(403));

        let err = serve_proxy(&Client::new(), &upstream.base_url, None).unwrap_err();

        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn proxy_gives_up_on_a_stalled_upstream() {
        let (url, closed) = stalling_upstream();
        let client = http_client_with_read_timeout(Duration::from_millis(300)).unwrap();

        let response = serve_proxy(&client, &url, None).unwrap();
        assert_eq!(response.status_code, 200);

        let started = Instant::now();
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut body = Vec::new();
        assert!(reader.read_to_end(&mut body).is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(body, b"abcd");

        // dropping the body releases the upstream connection
        drop(reader);
        assert!(closed.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for_path(Path::new("a.m4a")), "audio/x-m4a");
        assert_eq!(mime_for_path(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(mime_for_path(Path::new("a.bin")), "application/octet-stream");
    }
}
