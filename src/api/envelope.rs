//! Result envelope returned across the external interface

use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::{BundleError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure,
}

/// Failure as seen by an external caller: a stable kind and a message
/// free of internal paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BundleError> for ApiError {
    fn from(err: &BundleError) -> Self {
        Self {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ApiError) -> Self {
        Self {
            status: Status::Failure,
            data: None,
            error: Some(error),
        }
    }

    /// Wrap an internal result, logging the full error before it is reduced
    pub fn from_result(operation: &'static str, result: Result<T, BundleError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => {
                match e.kind() {
                    ErrorKind::IoError | ErrorKind::SnapshotError | ErrorKind::ConfigError => {
                        error!(operation, kind = ?e.kind(), error = %e, "Operation failed")
                    }
                    _ => warn!(operation, kind = ?e.kind(), error = %e, "Operation rejected"),
                }
                Self::failure(ApiError::from(&e))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(ApiError {
                kind: ErrorKind::IoError,
                message: "empty response".to_string(),
            }),
        }
    }
}
