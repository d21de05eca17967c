//! API error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Error codes reported by the HTTP API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    SerializationFailed,
    QueueSendFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::SerializationFailed => "SerializationFailed",
            Self::QueueSendFailed => "QueueSendFailed",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::SerializationFailed | Self::QueueSendFailed => 500,
        }
    }
}

/// Error returned to API callers
#[derive(Debug, Error)]
#[error("{}: {message}", code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as a JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            code: &'a str,
            message: &'a str,
            request_id: &'a str,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, self.code.as_str(), self.message)
        })
    }
}
