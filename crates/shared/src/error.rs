use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    Server,
    Network,
    InvalidResponse,
    Rejected,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            // Session-protected views redirect anonymous callers to the login page.
            300..=399 | 401 | 403 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            500..=599 => ErrorCode::Server,
            _ => ErrorCode::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Text suitable for showing to the patient.
    pub fn user_message(&self) -> String {
        match self.code {
            ErrorCode::Unauthorized => "Please log in to access this page.".to_string(),
            ErrorCode::NotFound => "The requested resource was not found.".to_string(),
            ErrorCode::Server => "Server error. Please try again later.".to_string(),
            ErrorCode::Network => {
                "Unable to connect to server. Please make sure the backend is running.".to_string()
            }
            _ if self.message.trim().is_empty() => "An unexpected error occurred.".to_string(),
            _ => self.message.clone(),
        }
    }
}
