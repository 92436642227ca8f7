use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Transport-level failures: the request never got as far as a disposition
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// Classifies an I/O error raised while streaming a multipart field
    pub fn from_body_error(err: std::io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
        {
            Some(multipart) if multipart.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Self::too_large()
            }
            _ => AppError::BadRequest("Malformed upload body".to_string()),
        }
    }

    fn too_large() -> Self {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large()
        } else {
            tracing::debug!("Rejected multipart body: {}", err);
            AppError::BadRequest("Malformed upload body".to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
