use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

use crate::{admission::Overloaded, metrics::Operation, process::ProcessError};

/// Every failure a request can end in. Rendered as `{"error": ...}` JSON.
#[derive(Debug)]
pub enum GatewayError {
    /// Missing or malformed client input.
    Validation(String),
    /// Admission denied; the client may retry later.
    Overloaded(Overloaded),
    ProcessTimeout(Operation),
    ProcessLaunch(String),
    /// The decoder exited non-zero.
    ProcessExecution { stderr: String, stdout: String },
    /// Neither encode attempt produced a RIFF payload.
    EncodingFailed,
    Parse {
        details: String,
        processing_time_seconds: f64,
    },
    Unexpected(String),
}

impl GatewayError {
    pub fn from_process(operation: Operation, err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { .. } => GatewayError::ProcessTimeout(operation),
            ProcessError::Launch { .. } => GatewayError::ProcessLaunch(err.to_string()),
            ProcessError::Io { .. } => GatewayError::Unexpected(err.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ProcessTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ProcessLaunch(_)
            | GatewayError::ProcessExecution { .. }
            | GatewayError::EncodingFailed
            | GatewayError::Parse { .. }
            | GatewayError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.to_string()));
        match self {
            GatewayError::Overloaded(overloaded) => {
                body.insert(
                    "retry_after_seconds".to_string(),
                    json!(overloaded.retry_after_seconds),
                );
                body.insert("active_requests".to_string(), json!(overloaded.in_flight));
            }
            GatewayError::ProcessExecution { stderr, stdout } => {
                body.insert("stderr".to_string(), json!(stderr));
                body.insert("stdout".to_string(), json!(stdout));
            }
            GatewayError::Parse {
                details,
                processing_time_seconds,
            } => {
                body.insert("details".to_string(), json!(details));
                body.insert(
                    "processing_time_seconds".to_string(),
                    json!(processing_time_seconds),
                );
            }
            GatewayError::ProcessLaunch(details) => {
                body.insert("details".to_string(), json!(details));
            }
            _ => {}
        }
        Value::Object(body)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Validation(message) => write!(f, "{message}"),
            GatewayError::Overloaded(_) => write!(f, "Service temporarily overloaded"),
            GatewayError::ProcessTimeout(Operation::Encode) => {
                write!(f, "Encoding process timed out")
            }
            GatewayError::ProcessTimeout(Operation::Decode) => {
                write!(f, "Decoding process timed out")
            }
            GatewayError::ProcessLaunch(_) => write!(f, "Failed to start external binary"),
            GatewayError::ProcessExecution { .. } => write!(f, "Failed to decode audio"),
            GatewayError::EncodingFailed => write!(f, "Failed to encode text to audio"),
            GatewayError::Parse { .. } => write!(f, "Failed to parse decode output"),
            GatewayError::Unexpected(message) => write!(f, "Unexpected error: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<Overloaded> for GatewayError {
    fn from(value: Overloaded) -> Self {
        GatewayError::Overloaded(value)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::{io, path::PathBuf, time::Duration};

    use super::*;

    #[test]
    fn overload_body_carries_retry_hint() {
        let err = GatewayError::from(Overloaded {
            in_flight: 3,
            retry_after_seconds: 5,
        });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            err.body(),
            json!({
                "error": "Service temporarily overloaded",
                "retry_after_seconds": 5,
                "active_requests": 3
            })
        );
    }

    #[test]
    fn process_errors_map_to_taxonomy() {
        let timeout = GatewayError::from_process(
            Operation::Decode,
            ProcessError::Timeout {
                program: PathBuf::from("/bin/decoder"),
                limit: Duration::from_secs(1),
            },
        );
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.to_string(), "Decoding process timed out");

        let launch = GatewayError::from_process(
            Operation::Encode,
            ProcessError::Launch {
                program: PathBuf::from("/bin/encoder"),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(launch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(launch, GatewayError::ProcessLaunch(_)));
    }

    #[test]
    fn validation_is_a_client_error() {
        let err = GatewayError::Validation("No text provided".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body(), json!({ "error": "No text provided" }));
    }
}
