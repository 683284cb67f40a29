use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, HeaderMapExt};
use axum_extra::TypedHeader;

use crate::session::{SessionState, StreamSession};
use crate::stream::DEFAULT_CHUNK_SIZE;
use crate::{ByteRange, MediaAsset, RangeBody, RangedStream};

/// Selects the status and headers for a validated window.
///
/// * no window: `200 OK` with the full `Content-Length`
/// * window: `206 Partial Content` with `Content-Range`, `Accept-Ranges`
///   and the window's length
///
/// `window` must lie within `asset.size`, which is what
/// [`crate::range::parse`] guarantees.
pub fn build_headers(window: Option<ByteRange>, asset: &MediaAsset) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    match window {
        None => {
            headers.typed_insert(ContentLength(asset.size));
            (StatusCode::OK, headers)
        }
        Some(range) => {
            let content_range = ContentRange::bytes(range.start..=range.end, asset.size)
                .expect("ContentRange::bytes cannot fail for a validated window");
            headers.typed_insert(content_range);
            headers.typed_insert(AcceptRanges::bytes());
            headers.typed_insert(ContentLength(range.len()));
            (StatusCode::PARTIAL_CONTENT, headers)
        }
    }
}

/// The main responder type. Implements [`IntoResponse`].
///
/// `body` must be sized to `asset`, as the handle returned by
/// [`MediaAsset::open`] is.
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    window: Option<ByteRange>,
    body: B,
    asset: MediaAsset,
    session: Option<StreamSession>,
    chunk_size: usize,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// and an already validated window.
    pub fn new(window: Option<ByteRange>, body: B, asset: MediaAsset) -> Self {
        Ranged { window, body, asset, session: None, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    /// Attaches the request's session, which must be in `RangeValidated`.
    pub fn with_session(mut self, session: StreamSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeNotSatisfiable`] if the window
    /// does not fit inside the asset.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RangeNotSatisfiable> {
        let Ranged { window, body, asset, session, chunk_size } = self;

        let mut session = session.unwrap_or_else(|| {
            let mut session = StreamSession::new(&asset.path);
            session.advance(SessionState::MetadataFetched);
            session.validated(window);
            session
        });

        if window.is_some_and(|range| range.end >= asset.size) {
            session.advance(SessionState::Failed);
            return Err(RangeNotSatisfiable(ContentRange::unsatisfied_bytes(asset.size)));
        }

        let (start, length) = match window {
            Some(range) => (range.start, range.len()),
            None => (0, asset.size),
        };

        let (status, headers) = build_headers(window, &asset);
        session.advance(SessionState::HeadersSent);
        tracing::debug!(
            session = %session.id(),
            status = status.as_u16(),
            start,
            length,
            "sending media"
        );

        let stream = RangedStream::new(body, start, length, session).with_chunk_size(chunk_size);
        Ok(RangedResponse { status, headers, stream })
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone)]
pub struct RangeNotSatisfiable(pub ContentRange);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct RangedResponse<B> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub stream: RangedStream<B>,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.stream).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum_extra::headers::{ContentLength, ContentRange, HeaderMapExt};
    use bytes::Bytes;
    use futures::{pin_mut, Stream, StreamExt};
    use tokio::fs::File;

    use super::build_headers;
    use crate::{ByteRange, KnownSize, MediaAsset, Ranged, SessionState};

    async fn collect_stream(stream: impl Stream<Item = io::Result<Bytes>>) -> String {
        let mut string = String::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            string += std::str::from_utf8(&chunk).unwrap();
        }
        string
    }

    async fn collect_body(body: axum::body::Body) -> String {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn fixture() -> (MediaAsset, KnownSize<File>) {
        let asset = MediaAsset::stat("test/fixture.txt", "text/plain").await.unwrap();
        let body = asset.open().await.unwrap();
        (asset, body)
    }

    fn window(start: u64, end: u64) -> Option<ByteRange> {
        ByteRange::new(start, end)
    }

    fn asset(size: u64) -> MediaAsset {
        MediaAsset { path: "video.mp4".into(), size, content_type: "video/mp4".into() }
    }

    #[test]
    fn test_headers_without_window() {
        let (status, headers) = build_headers(None, &asset(1000));

        assert_eq!(StatusCode::OK, status);
        assert_eq!(headers[header::CONTENT_LENGTH], "1000");
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
        assert!(headers.get(header::CONTENT_RANGE).is_none());
        assert!(headers.get(header::ACCEPT_RANGES).is_none());
    }

    #[test]
    fn test_headers_with_window() {
        let (status, headers) = build_headers(window(100, 199), &asset(1000));

        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::CONTENT_LENGTH], "100");
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    }

    #[test]
    fn test_open_ended_window_headers() {
        let (status, headers) = build_headers(window(900, 999), &asset(1000));

        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 900-999/1000");
        assert_eq!(headers[header::CONTENT_LENGTH], "100");
    }

    #[test]
    fn test_invalid_content_type_falls_back() {
        let mut asset = asset(10);
        asset.content_type = "video/mp4\n".into();
        let (_, headers) = build_headers(None, &asset);
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn test_full_response() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(None, body, asset).into_response();

        assert_eq!(StatusCode::OK, response.status());
        let head = response.headers();
        assert_eq!(head[header::CONTENT_LENGTH], "54");
        assert!(head.get(header::ACCEPT_RANGES).is_none());
        assert!(head.get(header::CONTENT_RANGE).is_none());

        let body = collect_body(response.into_body()).await;
        assert_eq!("Hello world this is a file to test range requests on!\n", body);
    }

    #[tokio::test]
    async fn test_partial_response_1() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(window(0, 29), body, asset).try_respond().unwrap();

        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status);
        assert_eq!(Some(ContentLength(30)), response.headers.typed_get::<ContentLength>());
        assert_eq!(Some(ContentRange::bytes(0..30, 54).unwrap()), response.headers.typed_get::<ContentRange>());
        assert_eq!(SessionState::HeadersSent, response.stream.session().state());
        assert_eq!("Hello world this is a file to ", &collect_stream(response.stream).await);
    }

    #[tokio::test]
    async fn test_partial_response_2() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(window(30, 53), body, asset).try_respond().unwrap();

        assert_eq!(Some(ContentLength(24)), response.headers.typed_get::<ContentLength>());
        assert_eq!(Some(ContentRange::bytes(30..54, 54).unwrap()), response.headers.typed_get::<ContentRange>());
        assert_eq!("test range requests on!\n", &collect_stream(response.stream).await);
    }

    #[tokio::test]
    async fn test_whole_asset_window_is_still_partial() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(window(0, 53), body, asset).into_response();

        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-53/54");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "54");
        let body = collect_body(response.into_body()).await;
        assert_eq!("Hello world this is a file to test range requests on!\n", body);
    }

    #[tokio::test]
    async fn test_one_byte_response() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(window(30, 30), body, asset).try_respond().unwrap();

        assert_eq!(Some(ContentRange::bytes(30..31, 54).unwrap()), response.headers.typed_get::<ContentRange>());
        assert_eq!("t", &collect_stream(response.stream).await);
    }

    #[tokio::test]
    async fn test_window_outside_asset() {
        let (asset, body) = fixture().await;
        let err = Ranged::new(window(50, 60), body, asset).try_respond().unwrap_err();

        assert_eq!(ContentRange::unsatisfied_bytes(54), err.0);

        let response = err.into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */54");
        assert_eq!("", collect_body(response.into_body()).await);
    }

    #[tokio::test]
    async fn test_small_chunks_reassemble() {
        let (asset, body) = fixture().await;
        let response = Ranged::new(window(6, 40), body, asset)
            .with_chunk_size(4)
            .try_respond()
            .unwrap();

        let body = collect_stream(response.stream).await;
        assert_eq!(35, body.len());
        assert_eq!("world this is a file to test range ", body);
    }
}
