use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kubescan_core::ScanError;
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NotFound(image_id) => {
                Self::not_found(format!("No scan result for {image_id}"))
            }
            ScanError::Validation(err) => {
                tracing::warn!(error = %err, "rejected scan report");
                Self::bad_request(err.to_string())
            }
            other => {
                tracing::error!(error = %other, "scan result operation failed");
                Self::internal("Internal Server Error")
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("Malformed request body: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescan_core::ReportError;

    #[test]
    fn maps_scan_errors_to_statuses() {
        let cases = [
            (ScanError::NotFound("img".into()), StatusCode::NOT_FOUND),
            (
                ScanError::Validation(ReportError::InvalidFormat("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (ScanError::Storage("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn storage_details_stay_server_side() {
        let err = AppError::from(ScanError::Storage("password=hunter2".into()));
        assert!(!err.message.contains("hunter2"));
    }
}
