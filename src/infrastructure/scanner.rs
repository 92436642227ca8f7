use crate::config::{InitError, ScanConfig, ScannerBackend};
use crate::services::scanner::{ScanClient, create_scanner};
use std::sync::Arc;
use tracing::info;

/// Opens the process-wide scan session. Misconfiguration is fatal; an
/// unreachable backend is only reported, since it may come up later.
pub async fn setup_scanner(config: &ScanConfig) -> Result<Arc<dyn ScanClient>, InitError> {
    let scanner = create_scanner(config)?;

    match config.backend {
        ScannerBackend::HttpGateway => info!(
            "🛡️  Scan backend: {} at {} (region {})",
            scanner.backend_name(),
            config.gateway_url,
            config.region
        ),
        ScannerBackend::ClamAv => info!(
            "🛡️  Scan backend: {} ({}:{})",
            scanner.backend_name(),
            config.clamav_host,
            config.clamav_port
        ),
    }

    // Warm up scanner connection
    if scanner.health_check().await {
        info!("🦠 Virus scanner connected successfully");
    } else {
        tracing::warn!("⚠️  Virus scanner unreachable! Uploads will fail until it responds.");
    }

    Ok(scanner)
}
