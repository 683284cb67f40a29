use std::io;
use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::ContentRange;

use crate::{RangeError, RangeNotSatisfiable};

/// Failures that can still be reported with a status code, i.e. anything
/// that happens before response headers are committed.
///
/// Once a [`crate::RangedStream`] is running, failures surface as
/// [`io::Error`]s from the body instead and end the connection early.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The asset is missing, or is not a regular file.
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Range(#[from] RangeError),

    /// Metadata lookup or open failed for a reason other than absence.
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

impl ServeError {
    /// Classifies an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ServeError::NotFound(path.to_path_buf()),
            _ => ServeError::Io(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::Range(RangeError::Malformed(_)) => StatusCode::BAD_REQUEST,
            ServeError::Range(RangeError::Unsatisfiable { .. }) => StatusCode::RANGE_NOT_SATISFIABLE,
            ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        match self {
            ServeError::NotFound(path) => {
                tracing::warn!(path = %path.display(), "media asset not found");
                StatusCode::NOT_FOUND.into_response()
            }
            ServeError::Range(RangeError::Malformed(header)) => {
                tracing::debug!(%header, "rejecting malformed range");
                StatusCode::BAD_REQUEST.into_response()
            }
            ServeError::Range(RangeError::Unsatisfiable { size }) => {
                tracing::debug!(size, "rejecting unsatisfiable range");
                RangeNotSatisfiable(ContentRange::unsatisfied_bytes(size)).into_response()
            }
            ServeError::Io(err) => {
                tracing::error!(error = %err, "storage error before headers were sent");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
