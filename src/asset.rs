use std::path::{Path, PathBuf};

use tokio::fs::File;

use crate::{KnownSize, ServeError};

/// Snapshot of the served asset taken at the start of a request.
///
/// `size` is not guaranteed to stay valid if the file is replaced or
/// truncated while a response is in flight; the stream pump treats such a
/// short read as fatal for that connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: String,
}

impl MediaAsset {
    /// Looks up the asset's size without reading any of its bytes.
    pub async fn stat(path: impl AsRef<Path>, content_type: &str) -> Result<MediaAsset, ServeError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ServeError::from_io(path, e))?;

        if !metadata.is_file() {
            return Err(ServeError::NotFound(path.to_path_buf()));
        }

        Ok(MediaAsset {
            path: path.to_path_buf(),
            size: metadata.len(),
            content_type: content_type.to_string(),
        })
    }

    /// Opens a read handle on the asset, sized to this snapshot.
    pub async fn open(&self) -> Result<KnownSize<File>, ServeError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| ServeError::from_io(&self.path, e))?;
        Ok(KnownSize::sized(file, self.size))
    }
}

/// Content type derived from the file extension, `application/octet-stream`
/// when unknown.
pub fn guess_content_type(path: impl AsRef<Path>) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
