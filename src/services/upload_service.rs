use crate::models::{Disposition, FailureReason, UploadedFile};
use crate::services::orchestrator::ScanOrchestrator;
use crate::services::staging::{StagingStore, StorageError};
use crate::utils::validation::{ValidationError, sanitize_filename};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

/// The `file` part of an upload form
pub struct FilePart<R> {
    /// Filename as sent by the client, untrusted
    pub file_name: String,
    pub reader: R,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request body broke off or exceeded the transport limit
    #[error("Failed to read upload body: {0}")]
    Body(#[source] std::io::Error),
}

/// Validates an upload, stages it and hands it to the orchestrator
pub struct UploadService {
    staging: Arc<StagingStore>,
    orchestrator: ScanOrchestrator,
}

impl UploadService {
    pub fn new(staging: Arc<StagingStore>, orchestrator: ScanOrchestrator) -> Self {
        Self {
            staging,
            orchestrator,
        }
    }

    pub async fn handle<R>(&self, part: Option<FilePart<R>>) -> Result<Disposition, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let part = part.ok_or(ValidationError::NoFilePart)?;
        if part.file_name.trim().is_empty() {
            return Err(ValidationError::EmptyFilename.into());
        }

        let sanitized_name = sanitize_filename(&part.file_name);

        let staged = match self.staging.stage(&sanitized_name, part.reader).await {
            Ok(staged) => staged,
            Err(StorageError::Read { source }) => return Err(UploadError::Body(source)),
            Err(e) => {
                tracing::error!("{}", e);
                return Ok(Disposition::Error {
                    reason: FailureReason::StorageFailed,
                });
            }
        };

        let file = UploadedFile {
            original_name: part.file_name,
            sanitized_name,
            staged_path: staged.path,
            byte_size: staged.size,
        };
        tracing::info!(
            "📥 Staged {:?} as {} ({} bytes)",
            file.original_name,
            file.staged_path.display(),
            file.byte_size
        );

        let disposition = self
            .orchestrator
            .classify_and_dispose(&file.staged_path, &file.sanitized_name)
            .await;
        tracing::info!("Upload {} resolved as {}", file.sanitized_name, disposition.label());

        Ok(disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scanner::{RawScanResult, ScanClient, ScanError};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingScanner(AtomicUsize);

    #[async_trait::async_trait]
    impl ScanClient for CountingScanner {
        async fn scan(&self, _path: &Path) -> Result<RawScanResult, ScanError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RawScanResult::Text(r#"{"foundMalwares":[]}"#.to_string()))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn service(dir: &Path) -> (UploadService, Arc<CountingScanner>) {
        let scanner = Arc::new(CountingScanner(AtomicUsize::new(0)));
        let staging = Arc::new(StagingStore::new(dir));
        let orchestrator = ScanOrchestrator::new(scanner.clone(), staging.clone());
        (UploadService::new(staging, orchestrator), scanner)
    }

    #[tokio::test]
    async fn test_missing_part_is_rejected_without_staging() {
        let dir = tempfile::tempdir().unwrap();
        let (service, scanner) = service(dir.path());
        let result = service.handle::<&[u8]>(None).await;
        assert!(matches!(
            result,
            Err(UploadError::Validation(ValidationError::NoFilePart))
        ));
        assert_eq!(scanner.0.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_filename_is_rejected_without_staging() {
        let dir = tempfile::tempdir().unwrap();
        let (service, scanner) = service(dir.path());
        let part = FilePart {
            file_name: String::new(),
            reader: &b"data"[..],
        };
        let result = service.handle(Some(part)).await;
        assert!(matches!(
            result,
            Err(UploadError::Validation(ValidationError::EmptyFilename))
        ));
        assert_eq!(scanner.0.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_traversal_name_is_staged_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path());
        let part = FilePart {
            file_name: "../../etc/passwd".to_string(),
            reader: &b"root:x:0:0"[..],
        };
        let disposition = service.handle(Some(part)).await.unwrap();
        assert_eq!(
            disposition,
            Disposition::Accepted {
                file_name: "passwd".to_string()
            }
        );
        assert!(dir.path().join("passwd").exists());
    }

    #[tokio::test]
    async fn test_unwritable_staging_root_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("never-created");
        let (service, scanner) = service(&root);
        let part = FilePart {
            file_name: "a.txt".to_string(),
            reader: &b"abc"[..],
        };

        let result = service.handle(Some(part)).await;

        assert!(matches!(
            result,
            Ok(Disposition::Error {
                reason: FailureReason::StorageFailed
            })
        ));
        assert_eq!(scanner.0.load(Ordering::SeqCst), 0);
        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
