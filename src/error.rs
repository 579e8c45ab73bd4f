//! Error types for the edgequake-pdf2xlsx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2XlsxError`] (**fatal**): something outside a conversion episode
//!   went wrong (input file unreadable, bad configuration, artifact could
//!   not be written). Returned as `Err(Pdf2XlsxError)`.
//!
//! * [`ConversionError`] (**episode outcome**): a single conversion attempt
//!   failed. It never propagates out of the orchestrator; it is stored in
//!   [`crate::state::ConversionState::Failed`] so the presentation layer can
//!   render it and the user can try again.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fallback message when the service fails without a usable error body.
pub const FALLBACK_SERVER_MESSAGE: &str = "Conversion failed";

/// User-facing message for a rejected (non-PDF) selection.
pub const INVALID_PDF_MESSAGE: &str = "Please select a valid PDF file.";

/// All fatal errors returned by the edgequake-pdf2xlsx library.
#[derive(Debug, Error)]
pub enum Pdf2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output spreadsheet.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact's blob was already released.
    #[error("Artifact '{name}' is no longer available; convert the file again")]
    ArtifactReleased { name: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// `/health` did not answer with `{"status":"ok"}`.
    #[error("Conversion service at '{url}' is not healthy: {reason}")]
    ServiceUnhealthy { url: String, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where in the episode a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong file type; rejected before any request is sent.
    Validation,
    /// The request could not be sent or the response could not be received.
    Network,
    /// The service answered with a failure status.
    Server,
    /// A success response could not be interpreted as a spreadsheet.
    Parse,
}

/// The failure payload of a conversion episode.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ConversionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConversionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation() -> Self {
        Self::new(ErrorKind::Validation, INVALID_PDF_MESSAGE)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }
}

impl From<reqwest::Error> for ConversionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConversionError::network(format!("Request to the conversion service timed out: {e}"))
        } else if e.is_connect() {
            ConversionError::network(format!("Could not reach the conversion service: {e}"))
        } else {
            ConversionError::network(format!("Network error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_displays_message_only() {
        let e = ConversionError::server("corrupt PDF");
        assert_eq!(e.to_string(), "corrupt PDF");
        assert_eq!(e.kind, ErrorKind::Server);
    }

    #[test]
    fn validation_error_uses_fixed_message() {
        let e = ConversionError::validation();
        assert_eq!(e.kind, ErrorKind::Validation);
        assert!(e.message.contains("valid PDF"), "got: {}", e.message);
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Network).unwrap();
        assert_eq!(json, "\"network\"");
    }

    #[test]
    fn output_write_failed_display() {
        let e = Pdf2XlsxError::OutputWriteFailed {
            path: PathBuf::from("/tmp/out.xlsx"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let msg = e.to_string();
        assert!(msg.contains("out.xlsx"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }

    #[test]
    fn service_unhealthy_display() {
        let e = Pdf2XlsxError::ServiceUnhealthy {
            url: "http://localhost:5000/health".into(),
            reason: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("HTTP 503"));
    }
}
