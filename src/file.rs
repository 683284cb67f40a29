use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{AsyncSeekStart, RangeBody};

/// Implements [`RangeBody`] for any [`AsyncRead`] and [`AsyncSeekStart`],
/// constructed with a byte size snapshotted ahead of time.
#[pin_project]
pub struct KnownSize<B: AsyncRead + AsyncSeekStart> {
    byte_size: u64,
    #[pin]
    body: B,
}

impl<B: AsyncRead + AsyncSeekStart> std::fmt::Debug for KnownSize<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownSize")
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

impl<B: AsyncRead + AsyncSeekStart> KnownSize<B> {
    /// Construct a [`KnownSize`] instance with a byte size supplied manually,
    /// typically the size reported by [`crate::MediaAsset::stat`].
    pub fn sized(body: B, byte_size: u64) -> Self {
        KnownSize { byte_size, body }
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncRead for KnownSize<B> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.body.poll_read(cx, buf)
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncSeekStart for KnownSize<B> {
    fn start_seek(
        self: Pin<&mut Self>,
        position: u64,
    ) -> io::Result<()> {
        let this = self.project();
        this.body.start_seek(position)
    }

    fn poll_complete(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.body.poll_complete(cx)
    }
}

impl<B: AsyncRead + AsyncSeekStart> RangeBody for KnownSize<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::fs::File;
    use tokio::io::AsyncReadExt;

    use crate::{AsyncSeekStart, RangeBody};

    use super::KnownSize;

    #[tokio::test]
    async fn test_file_size_is_snapshot() {
        let file = File::open("test/fixture.txt").await.unwrap();
        let len = file.metadata().await.unwrap().len();
        let known_size = KnownSize::sized(file, len);
        assert_eq!(54, known_size.byte_size());
    }

    #[tokio::test]
    async fn test_seek_then_read() {
        let mut body = KnownSize::sized(Cursor::new(b"0123456789".to_vec()), 10);

        std::pin::Pin::new(&mut body).start_seek(4).unwrap();
        std::future::poll_fn(|cx| std::pin::Pin::new(&mut body).poll_complete(cx))
            .await
            .unwrap();

        let mut rest = String::new();
        body.read_to_string(&mut rest).await.unwrap();
        assert_eq!("456789", rest);
    }
}
