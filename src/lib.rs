//! # media-range
//!
//! Serves a single media asset over HTTP with byte-range support, so that
//! `<video>` elements can seek without downloading the whole file.
//!
//! A request flows through five pieces:
//!
//! * [`MediaAsset::stat`] snapshots the asset's size and content type.
//! * [`range::parse`] turns the `Range` header into an optional [`ByteRange`].
//! * [`Ranged`] picks the status and header set (200, 206 or 416).
//! * [`RangedStream`] pumps the selected window from storage in bounded chunks.
//! * [`server::router`] maps the media route to the above and everything else
//!   to a landing page.
//!
//! The pump is generic over [`RangeBody`], so anything implementing both
//! [`AsyncRead`] and [`AsyncSeekStart`] can be streamed through the
//! [`KnownSize`] adapter.
//!
//! ```no_run
//! use media_range::server::{self, MediaSource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = MediaSource::new("video.mp4", "/video.mp4");
//!     let app = server::router(source);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod asset;
mod error;
mod file;
mod response;
mod stream;

pub mod config;
pub mod range;
pub mod server;
pub mod session;
pub mod supervisor;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use asset::{guess_content_type, MediaAsset};
pub use error::ServeError;
pub use file::KnownSize;
pub use range::RangeError;
pub use response::{build_headers, RangeNotSatisfiable, Ranged, RangedResponse};
pub use session::{SessionState, StreamSession};
pub use stream::{RangedStream, DEFAULT_CHUNK_SIZE};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying asset, as snapshotted when the body
    /// was created.
    ///
    /// If the asset changes underneath, the pump will notice a short read
    /// and fail the stream rather than send fewer bytes than declared.
    fn byte_size(&self) -> u64;
}

/// A validated, inclusive byte window `[start, end]` within an asset.
///
/// Only [`range::parse`] builds these from untrusted input, and it
/// guarantees `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range with inclusive start and end.
    ///
    /// Returns `None` if `end < start`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(ByteRange { start, end })
    }

    /// Number of bytes in the window. Never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}
