use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create staging directory {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read upload body: {source}")]
    Read {
        #[source]
        source: io::Error,
    },

    #[error("Failed to write staged file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove staged file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Directory holding uploads while they are scanned, and afterwards for
/// accepted files. Files are keyed by their sanitized name; concurrent
/// writers of the same name resolve last-write-wins.
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the staging directory if it is missing. Idempotent.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateRoot {
                path: self.root.clone(),
                source,
            })
    }

    /// Path a sanitized name is staged at. Rejects anything that is not a
    /// single plain path component.
    pub fn path_for(&self, safe_name: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(safe_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(safe_name)),
            _ => Err(StorageError::Write {
                path: self.root.join(safe_name),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "staged name must be a single path component",
                ),
            }),
        }
    }

    /// Streams `reader` to `<root>/<safe_name>`, replacing any existing file.
    ///
    /// Bytes land in a private temporary sibling first and are renamed into
    /// place, so the scanner never observes a partially written file.
    pub async fn stage<R>(&self, safe_name: &str, mut reader: R) -> Result<StagedFile, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.path_for(safe_name)?;
        let temp_path = self.root.join(format!(".{}.part", Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|source| StorageError::Write {
                    path: temp_path.clone(),
                    source,
                })?;

            let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
            let mut size: u64 = 0;
            loop {
                let n = reader
                    .read(&mut buffer)
                    .await
                    .map_err(|source| StorageError::Read { source })?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n])
                    .await
                    .map_err(|source| StorageError::Write {
                        path: temp_path.clone(),
                        source,
                    })?;
                size += n as u64;
            }

            file.sync_all().await.map_err(|source| StorageError::Write {
                path: temp_path.clone(),
                source,
            })?;
            drop(file);

            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(|source| StorageError::Write {
                    path: path.clone(),
                    source,
                })?;

            Ok::<u64, StorageError>(size)
        }
        .await;

        match result {
            Ok(size) => {
                tracing::debug!("Staged {} bytes at {}", size, path.display());
                Ok(StagedFile { path, size })
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Failed to clean up partial upload {}: {}",
                            temp_path.display(),
                            cleanup
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Deletes a staged file. A file that is already gone is logged, not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Staged file {} already removed", path.display());
                Ok(())
            }
            Err(source) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
