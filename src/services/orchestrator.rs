use crate::models::{Disposition, FailureReason, ScanVerdict};
use crate::services::scanner::{RawScanResult, ScanClient, ScanError};
use crate::services::staging::StagingStore;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Name reported for a detection that carries no name
pub const UNKNOWN_THREAT: &str = "Unknown threat";

#[derive(Deserialize)]
struct ScanReport {
    #[serde(rename = "foundMalwares", default)]
    found_malwares: Option<Vec<FoundMalware>>,
}

#[derive(Deserialize)]
struct FoundMalware {
    #[serde(rename = "malwareName", default)]
    malware_name: Option<String>,
}

/// Decodes either shape of backend answer into a verdict. Detection order is preserved.
pub fn parse_verdict(raw: RawScanResult) -> Result<ScanVerdict, ScanError> {
    let report: ScanReport = match raw {
        RawScanResult::Structured(value) => serde_json::from_value(value),
        RawScanResult::Text(text) => serde_json::from_str(&text),
    }
    .map_err(|e| ScanError::MalformedResponse(e.to_string()))?;

    let malware_names = report
        .found_malwares
        .unwrap_or_default()
        .into_iter()
        .map(|m| {
            m.malware_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_THREAT.to_string())
        })
        .collect();

    Ok(ScanVerdict::infected(malware_names))
}

/// Scans a staged file and carries out the verdict: delete on malware, keep when clean.
#[derive(Clone)]
pub struct ScanOrchestrator {
    scanner: Arc<dyn ScanClient>,
    staging: Arc<StagingStore>,
}

impl ScanOrchestrator {
    pub fn new(scanner: Arc<dyn ScanClient>, staging: Arc<StagingStore>) -> Self {
        Self { scanner, staging }
    }

    pub async fn classify_and_dispose(&self, staged_path: &Path, display_name: &str) -> Disposition {
        let start = Instant::now();
        let raw = self.scanner.scan(staged_path).await;
        info!(
            "Scan executed in {:.2} seconds.",
            start.elapsed().as_secs_f64()
        );

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error scanning file {}: {}", display_name, e);
                self.discard_unscanned(staged_path).await;
                return Disposition::Error {
                    reason: FailureReason::ScanFailed,
                };
            }
        };

        let verdict = match parse_verdict(raw) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("Unreadable scan result for {}: {}", display_name, e);
                self.discard_unscanned(staged_path).await;
                return Disposition::Error {
                    reason: FailureReason::MalformedResult,
                };
            }
        };

        if !verdict.is_malicious() {
            info!("✅ {} is clean, keeping it", display_name);
            return Disposition::Accepted {
                file_name: display_name.to_string(),
            };
        }

        warn!(
            "🦠 Malware detected in {}: {}",
            display_name,
            verdict.malware_names.join(", ")
        );

        if let Err(e) = self.staging.remove(staged_path).await {
            error!("Failed to delete infected file {}: {}", staged_path.display(), e);
            return Disposition::Error {
                reason: FailureReason::StorageFailed,
            };
        }
        if self.staging.exists(staged_path).await {
            error!(
                "Infected file {} still present after delete",
                staged_path.display()
            );
            return Disposition::Error {
                reason: FailureReason::StorageFailed,
            };
        }

        Disposition::Blocked {
            file_name: display_name.to_string(),
            malware_names: verdict.malware_names,
        }
    }

    /// Files whose scan did not complete are not retained
    async fn discard_unscanned(&self, staged_path: &Path) {
        if let Err(e) = self.staging.remove(staged_path).await {
            warn!("{}", e);
        }
    }
}
