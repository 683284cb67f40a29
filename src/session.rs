//! Per-request stream lifecycle.
//!
//! ```text
//! Init -> MetadataFetched -> RangeValidated -> HeadersSent -> Streaming -> Completed
//!                                                  \             \------> Aborted (peer gone)
//!  any non-terminal state --------------------------+--------------------> Failed
//! ```
//!
//! A [`StreamSession`] is owned by exactly one request. It is moved into the
//! response body once headers are committed, so dropping the body (which is
//! what hyper does when the peer disconnects) drops the session together
//! with the read handle.

use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use crate::{ByteRange, ServeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    MetadataFetched,
    RangeValidated,
    HeadersSent,
    Streaming,
    /// Every declared byte was handed to the connection.
    Completed,
    /// The peer went away, or the request was cancelled.
    Aborted,
    /// A validation or storage error ended the session.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted | SessionState::Failed)
    }

    /// Whether headers have been committed to the wire, after which the
    /// status code can no longer change.
    pub fn headers_committed(self) -> bool {
        matches!(self, SessionState::HeadersSent | SessionState::Streaming)
    }

    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            MetadataFetched => self == Init,
            RangeValidated => self == MetadataFetched,
            HeadersSent => self == RangeValidated,
            Streaming => self == HeadersSent,
            // an empty body completes without ever streaming
            Completed => self.headers_committed(),
            Aborted | Failed => true,
            Init => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct StreamSession {
    id: Uuid,
    asset: PathBuf,
    window: Option<ByteRange>,
    state: SessionState,
    sent: u64,
}

impl StreamSession {
    pub fn new(asset: impl Into<PathBuf>) -> Self {
        let session = StreamSession {
            id: Uuid::new_v4(),
            asset: asset.into(),
            window: None,
            state: SessionState::Init,
            sent: 0,
        };
        tracing::trace!(session = %session.id, asset = %session.asset.display(), "session started");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The validated window, `None` when the whole asset is served as 200.
    pub fn window(&self) -> Option<ByteRange> {
        self.window
    }

    /// Bytes handed to the connection so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Moves to `next`, returning `false` (and staying put) if the
    /// transition is not allowed from the current state.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::warn!(session = %self.id, from = %self.state, to = %next, "illegal session transition");
            return false;
        }
        tracing::trace!(session = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
        true
    }

    /// Records the validated window and advances to `RangeValidated`.
    pub fn validated(&mut self, window: Option<ByteRange>) -> bool {
        self.window = window;
        self.advance(SessionState::RangeValidated)
    }

    pub(crate) fn record_sent(&mut self, n: u64) {
        self.sent += n;
    }

    pub(crate) fn complete(&mut self) {
        if self.advance(SessionState::Completed) {
            tracing::debug!(session = %self.id, bytes = self.sent, "stream completed");
        }
    }

    /// Marks a failure once headers are on the wire. The connection will be
    /// cut short, so this is always logged as an error.
    pub(crate) fn fail(&mut self, err: &dyn fmt::Display) {
        let committed = self.state.headers_committed();
        if self.advance(SessionState::Failed) && committed {
            tracing::error!(
                session = %self.id,
                asset = %self.asset.display(),
                bytes = self.sent,
                error = %err,
                "stream failed after headers were sent, aborting connection"
            );
        }
    }

    /// Marks a failure before headers were sent and hands the error back,
    /// leaving the caller free to pick the status code.
    pub fn reject(&mut self, err: ServeError) -> ServeError {
        if self.advance(SessionState::Failed) {
            tracing::debug!(session = %self.id, status = %err.status(), error = %err, "request rejected");
        }
        err
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("window", &self.window)
            .field("state", &self.state)
            .field("sent", &self.sent)
            .finish()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        // peer disconnects are a normal way for a stream to end
        tracing::debug!(
            session = %self.id,
            state = %self.state,
            bytes = self.sent,
            "session dropped before completion"
        );
        self.state = SessionState::Aborted;
    }
}
