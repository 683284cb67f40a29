//! HTTP surface: the media route plus a landing page for everything else.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::range::{self, RangeError};
use crate::session::{SessionState, StreamSession};
use crate::stream::DEFAULT_CHUNK_SIZE;
use crate::{build_headers, guess_content_type, MediaAsset, Ranged, ServeError};

/// The one asset this server exposes, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Location of the asset on disk.
    pub path: PathBuf,
    /// Exact request path the asset is served on, e.g. `/video.mp4`.
    pub route: String,
    pub content_type: String,
    pub chunk_size: usize,
}

impl MediaSource {
    /// Content type is guessed from the file extension.
    pub fn new(path: impl Into<PathBuf>, route: impl Into<String>) -> Self {
        let path = path.into();
        let content_type = guess_content_type(&path);
        MediaSource {
            path,
            route: route.into(),
            content_type,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Builds the router: `GET` (and `HEAD`) on the exact media route streams
/// the asset, any other path gets the landing page. The router holds no
/// mutable state, so every worker can serve a clone of it.
pub fn router(source: MediaSource) -> Router {
    let route = source.route.clone();
    Router::new()
        .route(&route, get(stream_media))
        .fallback(landing_page)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(source))
}

async fn stream_media(
    State(source): State<Arc<MediaSource>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ServeError> {
    let mut session = StreamSession::new(&source.path);

    let asset = MediaAsset::stat(&source.path, &source.content_type)
        .await
        .map_err(|e| session.reject(e))?;
    session.advance(SessionState::MetadataFetched);

    let window = range_header(&headers)
        .and_then(|header| range::parse(header, asset.size))
        .map_err(|e| session.reject(e.into()))?;
    session.validated(window);

    if method == Method::HEAD {
        return Ok(headers_only(&asset, &mut session));
    }

    let body = asset.open().await.map_err(|e| session.reject(e))?;

    Ok(Ranged::new(window, body, asset)
        .with_session(session)
        .with_chunk_size(source.chunk_size)
        .into_response())
}

/// Answers a HEAD request without opening the asset. The session
/// completes here since no body will ever be polled.
fn headers_only(asset: &MediaAsset, session: &mut StreamSession) -> Response {
    let (status, headers) = build_headers(session.window(), asset);
    session.advance(SessionState::HeadersSent);
    session.complete();
    (status, headers).into_response()
}

/// Raw `Range` header, if any. Values that are not visible ASCII cannot
/// be a valid byte range and are reported as malformed.
fn range_header(headers: &HeaderMap) -> Result<Option<&str>, RangeError> {
    headers
        .get(header::RANGE)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| RangeError::Malformed(String::from_utf8_lossy(value.as_bytes()).into_owned()))
        })
        .transpose()
}

async fn landing_page(State(source): State<Arc<MediaSource>>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Streaming</title></head>\n<body>\n\
         <h1>Streaming</h1>\n<video src=\"{}\" controls></video>\n</body>\n</html>\n",
        escape_attr(&source.route)
    ))
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::{header, HeaderMap, HeaderValue};

    use axum::http::StatusCode;

    use super::{escape_attr, headers_only, range_header, MediaSource};
    use crate::session::{SessionState, StreamSession};
    use crate::{ByteRange, MediaAsset, RangeError};

    #[test]
    fn test_media_source_guesses_content_type() {
        let source = MediaSource::new("media/video.mp4", "/video.mp4");
        assert_eq!("video/mp4", source.content_type);

        let source = source.with_content_type("video/webm");
        assert_eq!("video/webm", source.content_type);
    }

    #[test]
    fn test_range_header_absent() {
        assert_eq!(Ok(None), range_header(&HeaderMap::new()));
    }

    #[test]
    fn test_range_header_not_ascii() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_bytes(b"bytes=\xff-1").unwrap());
        assert_matches!(range_header(&headers), Err(RangeError::Malformed(_)));
    }

    #[test]
    fn test_head_completes_session_without_body() {
        let asset = MediaAsset { path: "video.mp4".into(), size: 1000, content_type: "video/mp4".into() };
        let mut session = StreamSession::new("video.mp4");
        session.advance(SessionState::MetadataFetched);
        session.validated(ByteRange::new(100, 199));

        let response = headers_only(&asset, &mut session);
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");

        // not an abort: nothing was left unsent
        assert_eq!(SessionState::Completed, session.state());
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!("/a&amp;b&quot;&lt;c&gt;", escape_attr("/a&b\"<c>"));
        assert_eq!("/video.mp4", escape_attr("/video.mp4"));
    }
}
