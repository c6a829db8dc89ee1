// SPDX-License-Identifier: GPL-3.0-only
use std::time::Duration;

use crate::remote::traits::BackendKind;

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote document not found")]
    NotFound,

    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend has no such capability; retrying will never succeed
    #[error("The {backend} backend does not support {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },
}

impl RemoteError {
    pub fn status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        Self::Status {
            status: status.as_u16(),
            body: body.into(),
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Json(_) | Self::NotFound | Self::Unsupported { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(RemoteError::Status { status: 503, body: String::new() }.is_transient());
        assert!(RemoteError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!RemoteError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!RemoteError::NotFound.is_transient());
    }

    #[test]
    fn test_unsupported_is_distinct() {
        let err = RemoteError::Unsupported {
            backend: BackendKind::Pull,
            operation: "save",
        };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "The pull backend does not support save");
    }
}
