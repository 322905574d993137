//! Error types for hub API calls

use serde_json::Value;
use thiserror::Error;

/// Body carried by an [`ApiError`]: decoded JSON when the server sent JSON,
/// raw text otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum ApiMessage {
    Json(Value),
    Text(String),
}

impl ApiMessage {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Bare JSON strings print without quotes
            Self::Json(Value::String(s)) => write!(f, "{}", s),
            Self::Json(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Error returned by the hub API (or by the transport, in which case there is no status)
#[derive(Debug, Clone, Error)]
#[error("{}", summary(.status, .message))]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: ApiMessage,
}

impl ApiError {
    pub fn new(status: u16, message: ApiMessage) -> Self {
        Self {
            status: Some(status),
            message,
        }
    }

    /// Network-level failure: no status code, never retried
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: ApiMessage::Text(message.into()),
        }
    }

    /// User-facing description of the failure.
    ///
    /// `space_scoped` switches the 404 wording to the one used when the
    /// request addressed a space by id.
    pub fn describe(&self, space_scoped: bool) -> String {
        match self.status {
            Some(401) => "Operation FAILED : Unauthorized, if the problem persists, please reconfigure the hub url with `xyzmaps --hub-api`".to_string(),
            Some(403) => "Operation FAILED : Insufficient rights to perform action".to_string(),
            Some(404) if space_scoped => {
                "Operation FAILED: Resource with given id does not exist".to_string()
            }
            Some(404) => "Operation FAILED : Resource not found.".to_string(),
            Some(code) => format!(
                "OPERATION FAILED : Error code - {}, message - {}",
                code, self.message
            ),
            None => {
                let message = self.message.to_string();
                if message.contains("Insufficient rights.") {
                    "Operation FAILED - Insufficient rights to perform action".to_string()
                } else {
                    format!("OPERATION FAILED - {}", message)
                }
            }
        }
    }
}

fn summary(status: &Option<u16>, message: &ApiMessage) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("request failed: {}", message),
    }
}

/// Error returned by [`crate::executor::UploadExecutor::execute`]
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Gzip encoding failed; never retried or split
    #[error("Failed to compress request body: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ExecuteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.status,
            _ => None,
        }
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}
