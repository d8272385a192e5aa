use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use models::UserId;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::{SaveReader, SaveSink, StoreError, UserSaveStore};

/// Keeps each user save as a file named after the user id inside `root`.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Fails unless `root` exists and is a directory.
    pub async fn new<P: Into<PathBuf>>(root: P) -> Result<Self, StoreError> {
        let root = root.into();
        let info = fs::metadata(&root).await.map_err(|e| {
            StoreError::Config(format!("failed to stat root {}: {e}", root.display()))
        })?;
        if !info.is_dir() {
            return Err(StoreError::Config(format!(
                "provided root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user_id: &UserId) -> PathBuf {
        self.root.join(user_id.as_str())
    }
}

#[async_trait]
impl UserSaveStore for FileSystemStore {
    async fn fetch(&self, user_id: &UserId) -> Result<SaveReader, StoreError> {
        match fs::File::open(self.path_for(user_id)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Io(io::Error::new(
                e.kind(),
                format!("failed to open file for user ID {user_id}: {e}"),
            ))),
        }
    }

    async fn save(&self, user_id: &UserId) -> Result<Box<dyn SaveSink>, StoreError> {
        let final_path = self.path_for(user_id);
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", user_id, uuid::Uuid::new_v4()));
        let file = fs::File::create(&tmp_path).await?;
        debug!(path = %tmp_path.display(), "opened user save sink");
        Ok(Box::new(FileSink { file, tmp_path, final_path, committed: false }))
    }
}

/// Writes into a hidden temp file beside the target and renames it on commit,
/// so readers only ever see a complete document.
struct FileSink {
    file: fs::File,
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl AsyncWrite for FileSink {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl SaveSink for FileSink {
    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        fs::rename(&self.tmp_path, &self.final_path).await?;
        self.committed = true;
        Ok(())
    }
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to discard uncommitted user save");
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let path = std::mem::take(&mut self.tmp_path);
        // Keep the unlink off async worker threads when a runtime is around.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || discard(&path));
            }
            Err(_) => discard(&path),
        }
    }
}
