use std::time::Duration;

use parking_ledger::LedgerError;
use thiserror::Error;

/// Failures of the OCR collaborator. All of them mean "no plate" for the
/// current capture.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("failed to initialize Tesseract: {0}")]
    Init(String),

    #[error("failed to configure Tesseract: {0}")]
    Configure(String),

    #[error("text recognition failed: {0}")]
    Recognize(String),

    #[error("text recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("OCR worker is not running")]
    WorkerGone,
}

#[derive(Error, Debug)]
pub enum StationError {
    /// Empty, unreadable or non BGR frame. Aborts this capture only.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("plate number not detected")]
    NoPlateDetected,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl StationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StationError::InvalidImage(_) => "INVALID_IMAGE",
            StationError::NoPlateDetected => "NO_PLATE_DETECTED",
            StationError::Ledger(e) => e.error_code(),
            StationError::OpenCv(_) => "OPENCV_ERROR",
        }
    }

    /// The operator should rescan or wait, nothing is broken.
    pub fn is_retryable(&self) -> bool {
        match self {
            StationError::NoPlateDetected => true,
            StationError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Ledger(e) if e.is_fatal())
    }
}
