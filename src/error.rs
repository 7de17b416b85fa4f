//! Error types for fx-report

use crate::types::Source;
use thiserror::Error;

/// Main error type for fx-report
#[derive(Error, Debug)]
pub enum FxError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Source unavailable ({origin}): {reason}")]
    SourceUnavailable { origin: Source, reason: String },

    #[error("Malformed payload from {origin}: {reason}")]
    MalformedPayload { origin: Source, reason: String },

    #[error("No data for the requested range and sources")]
    NoData,

    #[error("Export failure: {0}")]
    ExportFailure(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// User-facing classification of an [`FxError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected request, the caller should fix its input
    InvalidRange,
    /// An upstream source failed or returned unusable data
    SourceUnavailable,
    /// Every requested source succeeded but nothing came back
    NoData,
    /// The artifact could not be written
    ExportFailure,
    /// Anything unexpected
    Internal,
}

impl FxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FxError::InvalidRange(_) => ErrorKind::InvalidRange,
            FxError::SourceUnavailable { .. } | FxError::MalformedPayload { .. } => {
                ErrorKind::SourceUnavailable
            }
            FxError::NoData => ErrorKind::NoData,
            FxError::ExportFailure(_) => ErrorKind::ExportFailure,
            FxError::InvalidRecord(_)
            | FxError::ConfigError(_)
            | FxError::IoError(_)
            | FxError::SerdeError(_)
            | FxError::Unknown(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure was caused by the request itself
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidRange | ErrorKind::NoData)
    }

    pub(crate) fn unavailable(origin: Source, reason: impl Into<String>) -> Self {
        FxError::SourceUnavailable {
            origin,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(origin: Source, reason: impl Into<String>) -> Self {
        FxError::MalformedPayload {
            origin,
            reason: reason.into(),
        }
    }
}

/// Result type alias for fx-report operations
pub type Result<T> = std::result::Result<T, FxError>;
