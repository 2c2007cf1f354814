//! Error types for forgeci-gateway

use thiserror::Error;

/// Longest response body kept in an error.
const MAX_BODY_CHARS: usize = 512;

/// Gateway operation, carried in errors so callers can tell which call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadFile,
    WriteFile,
    Dispatch,
    ListRuns,
    ListArtifacts,
    Download,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::ReadFile => "read file",
            Operation::WriteFile => "write file",
            Operation::Dispatch => "workflow dispatch",
            Operation::ListRuns => "list workflow runs",
            Operation::ListArtifacts => "list artifacts",
            Operation::Download => "artifact download",
        };
        f.write_str(name)
    }
}

/// Errors that can occur talking to the repository API
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error during {operation}: {message}")]
    Http { operation: Operation, message: String },

    /// The API answered with an unexpected status code
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("unexpected {operation} response: {message}")]
    Decode { operation: Operation, message: String },

    /// The run lists no artifacts
    #[error("workflow run {run_id} has no artifacts")]
    NoArtifact { run_id: u64 },

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// Local file system error while persisting an artifact
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub(crate) fn http(operation: Operation) -> impl FnOnce(reqwest::Error) -> GatewayError {
        move |err| GatewayError::Http {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(operation: Operation) -> impl FnOnce(reqwest::Error) -> GatewayError {
        move |err| GatewayError::Decode {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn status(operation: Operation, status: u16, body: &str) -> GatewayError {
        let body: String = body.chars().take(MAX_BODY_CHARS).collect();
        GatewayError::Status {
            operation,
            status,
            body,
        }
    }

    /// HTTP status code, if the API answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
