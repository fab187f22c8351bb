//! Adapters over the rendered output file.
//!
//! The engine writes its artifact to disk and reports the path; the
//! coordination core itself never deletes anything. These adapters consume
//! the path on the caller's behalf: implicit temporary outputs are removed
//! once consumed, explicit destinations are always left alone.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncRead, ReadBuf},
};
use tracing::warn;

use torchio_wire::{ResourceSummary, TerminalResult};

use crate::error::EngineError;

/// A rendered document on disk, plus the asset bookkeeping that produced it.
#[derive(Debug)]
pub struct RenderArtifact {
    path: PathBuf,
    resources: ResourceSummary,
    /// True when the caller asked for this exact path; such files are the
    /// caller's to manage and the adapters never delete them.
    explicit_destination: bool,
}

impl RenderArtifact {
    pub(crate) fn from_result(result: TerminalResult, explicit_destination: bool) -> Self {
        Self {
            path: PathBuf::from(result.filename),
            resources: result.resources,
            explicit_destination,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resources(&self) -> &ResourceSummary {
        &self.resources
    }

    /// Leave the file in place and hand over its path.
    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Read the whole document into memory. A temporary output file is
    /// deleted after the read.
    pub async fn into_bytes(self) -> Result<Bytes, EngineError> {
        let data = tokio::fs::read(&self.path).await?;
        if !self.explicit_destination {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(Bytes::from(data))
    }

    /// Open the document for streaming reads. A temporary output file is
    /// deleted once the stream is dropped.
    pub async fn into_stream(self) -> Result<ArtifactStream, EngineError> {
        let file = File::open(&self.path).await?;
        let cleanup = (!self.explicit_destination).then(|| self.path.clone());
        Ok(ArtifactStream { file, cleanup })
    }
}

/// Streaming reader over a rendered document. Dropping it removes the backing
/// file when the file was an implicit temporary.
#[derive(Debug)]
pub struct ArtifactStream {
    file: File,
    cleanup: Option<PathBuf>,
}

impl AsyncRead for ArtifactStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if let Some(path) = self.cleanup.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!(
                    target = "torchio::artifact",
                    op = "artifact::cleanup",
                    path = %path.display(),
                    error = %err,
                    "Failed to remove temporary render output"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use torchio_wire::TerminalResult;

    fn artifact_for(path: &Path, explicit: bool) -> RenderArtifact {
        RenderArtifact::from_result(
            TerminalResult {
                filename: path.display().to_string(),
                resources: ResourceSummary::default(),
            },
            explicit,
        )
    }

    #[tokio::test]
    async fn into_bytes_deletes_temporary_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.pdf");
        tokio::fs::write(&path, b"%PDF-1.4 fake").await.expect("write");

        let bytes = artifact_for(&path, false).into_bytes().await.expect("read");
        assert_eq!(&bytes[..], b"%PDF-1.4 fake");
        assert!(!path.exists(), "temporary output should be gone");
    }

    #[tokio::test]
    async fn into_bytes_keeps_explicit_destination() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("kept.pdf");
        tokio::fs::write(&path, b"data").await.expect("write");

        let bytes = artifact_for(&path, true).into_bytes().await.expect("read");
        assert_eq!(&bytes[..], b"data");
        assert!(path.exists(), "explicit destination must survive");
    }

    #[tokio::test]
    async fn stream_drop_deletes_temporary_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("streamed.pdf");
        tokio::fs::write(&path, b"streamed contents").await.expect("write");

        let mut stream = artifact_for(&path, false).into_stream().await.expect("open");
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).await.expect("read");
        assert_eq!(contents, b"streamed contents");

        drop(stream);
        assert!(!path.exists(), "temporary output should be gone after drop");
    }
}
