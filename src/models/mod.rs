use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use utoipa::ToSchema;

/// A file received from a client and written to the staging directory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub sanitized_name: String,
    pub staged_path: PathBuf,
    pub byte_size: u64,
}

/// Classification of one staged file.
///
/// Malicious exactly when `malware_names` is non-empty; there is no separate
/// flag that could disagree with the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanVerdict {
    pub malware_names: Vec<String>,
}

impl ScanVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn infected(malware_names: Vec<String>) -> Self {
        Self { malware_names }
    }

    pub fn is_malicious(&self) -> bool {
        !self.malware_names.is_empty()
    }
}

/// Why an upload ended in [`Disposition::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The scanning backend could not be reached or refused the request
    ScanFailed,
    /// The backend answered with something that is not a scan report
    MalformedResult,
    /// The upload could not be written to the staging directory
    StorageFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed => f.write_str("scan failed"),
            Self::MalformedResult => f.write_str("malformed scan result"),
            Self::StorageFailed => f.write_str("storage failure"),
        }
    }
}

/// Final outcome of one upload. Produced once per request and never revised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Clean; the file stays in the staging directory
    Accepted { file_name: String },
    /// Malware found; the staged file has been deleted
    Blocked {
        file_name: String,
        malware_names: Vec<String>,
    },
    Error { reason: FailureReason },
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Blocked { .. } => "blocked",
            Self::Error { .. } => "error",
        }
    }
}
