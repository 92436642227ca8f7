use crate::AppState;
use crate::api::error::AppError;
use crate::models::Disposition;
use crate::services::upload_service::{FilePart, UploadError};
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart form field carrying the file
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Accepted,
    Blocked,
    Error,
    Invalid,
}

/// Alert styling hint for the page showing the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Danger,
    Warning,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub level: MessageLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub malware_names: Vec<String>,
}

impl UploadResponse {
    pub fn from_disposition(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Accepted { file_name } => Self {
                status: UploadStatus::Accepted,
                level: MessageLevel::Success,
                message: "File successfully uploaded. Thank you!".to_string(),
                file_name: Some(file_name),
                malware_names: Vec::new(),
            },
            Disposition::Blocked {
                file_name,
                malware_names,
            } => Self {
                status: UploadStatus::Blocked,
                level: MessageLevel::Danger,
                message: format!(
                    "File upload blocked. The uploaded file contains one or more types of malware. \
                     Detected malware: {}. File name: {}. \
                     Please contact IT support for assistance, or try uploading a clean version of the file.",
                    malware_names.join(", "),
                    file_name
                ),
                file_name: Some(file_name),
                malware_names,
            },
            Disposition::Error { .. } => Self {
                status: UploadStatus::Error,
                level: MessageLevel::Danger,
                message: "An error occurred while scanning the file.".to_string(),
                file_name: None,
                malware_names: Vec::new(),
            },
        }
    }

    pub fn invalid(err: &ValidationError) -> Self {
        Self {
            status: UploadStatus::Invalid,
            level: MessageLevel::Warning,
            message: err.user_message().to_string(),
            file_name: None,
            malware_names: Vec::new(),
        }
    }
}

/// Form schema for the OpenAPI document
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(format = Binary)]
    file: String,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File scanned: accepted, blocked, or scan error", body = UploadResponse),
        (status = 400, description = "No file part or no selected file", body = UploadResponse),
        (status = 413, description = "Request body exceeds the configured limit")
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut outcome = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A plain form value under the same name is not a file part
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let body_with_io_error = field.map_err(std::io::Error::other);
        let reader = StreamReader::new(body_with_io_error);

        outcome = Some(
            state
                .upload_service
                .handle(Some(FilePart { file_name, reader }))
                .await,
        );
        break;
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => state.upload_service.handle::<tokio::io::Empty>(None).await,
    };

    match outcome {
        Ok(disposition) => Ok((
            StatusCode::OK,
            Json(UploadResponse::from_disposition(disposition)),
        )),
        Err(UploadError::Validation(err)) => {
            tracing::warn!("Upload rejected: {}", err);
            // Drain the remaining parts before answering
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Ok((StatusCode::BAD_REQUEST, Json(UploadResponse::invalid(&err))))
        }
        Err(UploadError::Body(err)) => {
            tracing::warn!("Upload body failed: {}", err);
            Err(AppError::from_body_error(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureReason;

    #[test]
    fn test_blocked_message_lists_malware_and_file() {
        let response = UploadResponse::from_disposition(Disposition::Blocked {
            file_name: "evil.exe".to_string(),
            malware_names: vec!["Trojan.X".to_string(), "Worm.Y".to_string()],
        });
        assert_eq!(response.status, UploadStatus::Blocked);
        assert_eq!(response.level, MessageLevel::Danger);
        assert!(response.message.contains("Detected malware: Trojan.X, Worm.Y"));
        assert!(response.message.contains("File name: evil.exe"));
    }

    #[test]
    fn test_error_message_hides_reason() {
        let response = UploadResponse::from_disposition(Disposition::Error {
            reason: FailureReason::MalformedResult,
        });
        assert_eq!(response.message, "An error occurred while scanning the file.");
        assert!(!response.message.contains("malformed"));
    }

    #[test]
    fn test_invalid_messages() {
        assert_eq!(
            UploadResponse::invalid(&ValidationError::EmptyFilename).message,
            "No selected file."
        );
        assert_eq!(
            UploadResponse::invalid(&ValidationError::NoFilePart).level,
            MessageLevel::Warning
        );
    }
}
