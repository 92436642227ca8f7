use crate::config::AppConfig;
use crate::services::staging::{StagingStore, StorageError};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> Result<Arc<StagingStore>, StorageError> {
    let store = StagingStore::new(&config.upload_dir);
    store.ensure_root().await?;

    info!("📁 Staging directory: {}", store.root().display());
    Ok(Arc::new(store))
}
