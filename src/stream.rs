use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::session::{SessionState, StreamSession};
use crate::RangeBody;

/// Bytes read from storage per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Response body stream. Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// The stream only reads when polled, and hyper only polls a body when the
/// connection can take more data, so at most one chunk is buffered per
/// session. Dropping the stream releases the read handle immediately.
///
/// Yields exactly `length` bytes or ends with an error: a storage error, or
/// [`io::ErrorKind::UnexpectedEof`] if the asset turns out shorter than the
/// declared length. Either error makes hyper abort the connection, since the
/// `Content-Length` is already on the wire.
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    chunk_size: usize,
    session: StreamSession,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64, session: StreamSession) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            length,
            chunk_size: DEFAULT_CHUNK_SIZE,
            session,
            body,
        }
    }

    /// Overrides the per-chunk read size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }
}

impl<B> std::fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .field("chunk_size", &self.chunk_size)
            .field("session", &self.session)
            .finish()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Done,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            if *this.length == 0 {
                *this.state = StreamState::Done;
                this.session.complete();
                return Poll::Ready(None);
            }

            this.session.advance(SessionState::Streaming);
            match this.body.as_mut().start_seek(start) {
                Err(e) => { return fail(this.state, this.session, e); }
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.body.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return fail(this.state, this.session, e); }
                Poll::Ready(Ok(())) => {
                    let buffer = allocate_buffer(*this.chunk_size, remaining);
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        if let StreamState::Reading { buffer, remaining } = this.state {
            let uninit = buffer.spare_capacity_mut();

            // never read past the window or the chunk size, even if the
            // buffer has more room
            let nbytes = uninit
                .len()
                .min(*this.chunk_size)
                .min(usize::try_from(*remaining).unwrap_or(usize::MAX));

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            return match this.body.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Err(e)) => fail(this.state, this.session, e),
                Poll::Ready(Ok(())) => match read_buf.filled().len() {
                    0 => {
                        let missing = *remaining;
                        let e = io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("asset ended {missing} bytes short of the declared length"),
                        );
                        fail(this.state, this.session, e)
                    }
                    n => {
                        // SAFETY: poll_read has initialised the first `n`
                        // bytes of the spare capacity, and `buffer.len()` is
                        // always 0 here
                        unsafe { buffer.set_len(buffer.len() + n); }

                        // n <= remaining because of the min above
                        let read = n as u64;
                        *remaining -= read;
                        this.session.record_sent(read);

                        let chunk = if *remaining == 0 {
                            let chunk = mem::take(buffer);
                            *this.state = StreamState::Done;
                            this.session.complete();
                            chunk
                        } else {
                            let next = allocate_buffer(*this.chunk_size, *remaining);
                            mem::replace(buffer, next)
                        };

                        Poll::Ready(Some(Ok(chunk.freeze())))
                    }
                },
            };
        }

        Poll::Ready(None)
    }
}

fn fail(state: &mut StreamState, session: &mut StreamSession, e: io::Error) -> Poll<Option<io::Result<Bytes>>> {
    *state = StreamState::Done;
    session.fail(&e);
    Poll::Ready(Some(Err(e)))
}

fn allocate_buffer(chunk_size: usize, remaining: u64) -> BytesMut {
    let len = usize::try_from(remaining).map_or(chunk_size, |r| r.min(chunk_size));
    BytesMut::with_capacity(len)
}
