use std::{
    fmt::Display,
    path::{Path, PathBuf, StripPrefixError},
    sync::Arc,
};

use bytes::Bytes;
use futures::{Stream, StreamExt as _, TryFutureExt as _, TryStreamExt as _, pin_mut};
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt as _};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::{
    Store, StoreInfo, ValidPath,
    error::{StoreError, StoreResult},
};

#[inline]
fn hex(bytes: &[u8]) -> String {
    base16ct::lower::encode_string(bytes)
}

/// Temporary sibling of the final path, on the same filesystem so the final
/// rename is atomic. Creates missing parent directories along the way.
async fn tmp_path(root: &Path, path: &Path) -> StoreResult<PathBuf> {
    let id = uuid::Uuid::new_v4().to_string();
    let tmp_ext = format!("{id}.tmp");
    let tmp_path = path.with_extension(&tmp_ext);
    let tmp_path = root.join(tmp_path);
    if let Some(parent) = tmp_path.parent() {
        let meta = fs::metadata(parent).await;
        match meta {
            Ok(meta) => {
                if !meta.is_dir() {
                    error!("Parent is not a directory: {parent:?}");
                    return Err(StoreError::InvalidPath);
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    fs::create_dir_all(parent).await?;
                } else {
                    error!("Failed to stat parent: {parent:?}: {e}");
                    return Err(e.into());
                }
            }
        }
    }
    Ok(tmp_path)
}

async fn cleanup<E: Display>(path: &Path, error: E) -> Result<(), E> {
    error!("Failed to store file to path {path:?}: {error}");
    if path.exists() {
        fs::remove_file(path)
            .await
            .map_err(|e| error!("Failed to remove file {path:?}: {e}"))
            .ok();
    }
    Err(error)
}

struct FileStoreInner {
    root: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(FileStoreInner {
                root: root.into(),
                lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn relative_path(&self, path: &impl AsRef<Path>) -> Result<ValidPath, StripPrefixError> {
        let relative_path = path.as_ref().strip_prefix(&self.inner.root)?;
        let final_path = relative_path.to_str().unwrap().to_string(); // safe, path was created from a ValidPath string
        Ok(ValidPath(final_path))
    }

    /// Final destination must not exist yet - names are generated to be
    /// unique, a collision means something went badly wrong upstream.
    async fn commit(&self, tmp_path: &Path, path: &ValidPath) -> StoreResult<PathBuf> {
        let final_path = self.inner.root.join(path.as_ref());
        let _lock = self.inner.lock.lock().await;
        if fs::try_exists(&final_path).await? {
            cleanup(tmp_path, StoreError::PathConflict).await?;
        }
        fs::rename(tmp_path, &final_path).await?;
        Ok(final_path)
    }
}

impl Store for FileStore {
    async fn store_data(&self, path: &ValidPath, data: &[u8]) -> StoreResult<StoreInfo> {
        let tmp_path = tmp_path(&self.inner.root, Path::new(path.as_ref())).await?;
        let mut file = fs::File::create(&tmp_path)
            .await
            .inspect_err(|e| error!("Failed to create tmp file {tmp_path:?}: {e}"))?;
        file.write_all(data)
            .or_else(|e| cleanup(&tmp_path, e))
            .await?;
        file.flush().await?;
        file.sync_all().await?;
        let final_path = self.commit(&tmp_path, path).await?;
        debug!("Stored {} bytes to {final_path:?}", data.len());
        let digest = Sha256::digest(data);
        let final_path = self.relative_path(&final_path).unwrap(); // safe, built from root
        Ok(StoreInfo {
            final_path,
            size: data.len() as u64,
            hash: hex(&digest),
        })
    }

    async fn store_stream<S, E>(&self, path: &ValidPath, stream: S) -> StoreResult<StoreInfo>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<StoreError>,
    {
        let tmp_path = tmp_path(&self.inner.root, Path::new(path.as_ref())).await?;
        let mut file = fs::File::create(&tmp_path)
            .await
            .inspect_err(|e| error!("Failed to create tmp file {tmp_path:?}: {e}"))?;
        let mut size = 0;
        pin_mut!(stream);
        let mut digester = Sha256::new();
        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|e| e.into()) {
                Ok(chunk) => {
                    file.write_all(&chunk)
                        .or_else(|e| cleanup(&tmp_path, e))
                        .await?;
                    size += chunk.len() as u64;
                    digester.update(&chunk);
                }
                Err(e) => {
                    cleanup(&tmp_path, e).await?;
                    unreachable!()
                }
            }
        }
        file.flush().await?;
        let final_path = self.commit(&tmp_path, path).await?;
        debug!("Stored {size} bytes to {final_path:?}");
        let digest = digester.finalize();
        let final_path = self.relative_path(&final_path).unwrap();
        Ok(StoreInfo {
            final_path,
            size,
            hash: hex(&digest),
        })
    }

    async fn load_data(
        &self,
        path: &ValidPath,
    ) -> Result<impl Stream<Item = StoreResult<Bytes>> + 'static, StoreError> {
        let final_path = self.inner.root.join(path.as_ref());
        let file = fs::File::open(&final_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(path.as_ref().to_string())
            } else {
                e.into()
            }
        })?;
        let stream = ReaderStream::new(file).map_err(StoreError::from);
        Ok(stream)
    }

    async fn remove(&self, path: &ValidPath) -> StoreResult<()> {
        let final_path = self.inner.root.join(path.as_ref());
        match fs::remove_file(&final_path).await {
            Ok(()) => {
                debug!("Removed {final_path:?}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Already absent: {final_path:?}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, path: &ValidPath) -> StoreResult<u64> {
        let final_path = self.inner.root.join(path.as_ref());
        let meta = fs::metadata(&final_path).await?;
        Ok(meta.len())
    }

    fn local_path(&self, path: &ValidPath) -> Option<std::path::PathBuf> {
        Some(self.inner.root.join(path.as_ref()))
    }
}
