use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthorized,
    /// The server already holds an active session for this worker.
    #[error("{0}")]
    Conflict(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classifies a non-success answer from the backend.
    pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized;
        }
        if status == StatusCode::CONFLICT || reports_active_session(&message) {
            return ApiError::Conflict(message);
        }
        if status.is_server_error() {
            return ApiError::Unavailable(message);
        }
        ApiError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Unavailable(format!("Request failed: {}", err))
        }
    }
}

fn reports_active_session(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already clocked in")
}
