//! File intake: validate a user-selected file and hold the current selection.
//!
//! A [`RawFile`] is whatever the presentation layer picked up (file dialog,
//! drag-and-drop, command-line path) together with its *declared* MIME type.
//! [`FileIntake::select`] turns it into an accepted [`FileCandidate`] only
//! when that type is exactly `application/pdf`. Nothing here touches the
//! network: a rejected file never reaches the conversion service.

use crate::error::{ConversionError, Pdf2XlsxError};
use std::path::Path;
use tracing::{debug, info};

/// The only MIME type the conversion service accepts.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// An unvalidated file as handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    /// Read a file from disk, declaring its MIME type from its content.
    ///
    /// The `%PDF` signature wins over the extension, so a renamed PDF is
    /// still accepted and a `.pdf` that is really a text file is not.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Pdf2XlsxError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Pdf2XlsxError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Pdf2XlsxError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Pdf2XlsxError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = sniff_mime_type(path, &content).to_string();
        debug!("Read {} ({} bytes, {})", path.display(), content.len(), mime_type);

        Ok(Self {
            name,
            mime_type,
            content,
        })
    }
}

/// Declare a MIME type for `content` read from `path`.
pub fn sniff_mime_type(path: &Path, content: &[u8]) -> &'static str {
    if content.starts_with(b"%PDF") {
        return PDF_MIME_TYPE;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" | "csv" => "text/plain",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// A file that passed validation. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    name: String,
    mime_type: String,
    content: Vec<u8>,
}

impl FileCandidate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// Holds the currently selected file, if any.
#[derive(Debug, Default)]
pub struct FileIntake {
    candidate: Option<FileCandidate>,
    last_error: Option<ConversionError>,
}

impl FileIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `raw` and make it the current selection.
    ///
    /// On rejection the previous selection is dropped as well.
    pub fn select(&mut self, raw: RawFile) -> Result<FileCandidate, ConversionError> {
        if raw.mime_type != PDF_MIME_TYPE {
            info!("Rejected '{}': declared type {}", raw.name, raw.mime_type);
            let err = ConversionError::validation();
            self.candidate = None;
            self.last_error = Some(err.clone());
            return Err(err);
        }

        let candidate = FileCandidate {
            name: raw.name,
            mime_type: raw.mime_type,
            content: raw.content,
        };
        info!("Selected '{}' ({} bytes)", candidate.name, candidate.size_bytes());
        self.candidate = Some(candidate.clone());
        self.last_error = None;
        Ok(candidate)
    }

    /// Drop the current selection. Idempotent.
    pub fn clear(&mut self) {
        if let Some(c) = self.candidate.take() {
            debug!("Cleared selection '{}'", c.name);
        }
    }

    pub fn candidate(&self) -> Option<&FileCandidate> {
        self.candidate.as_ref()
    }

    /// The validation error from the most recent rejected selection.
    pub fn last_error(&self) -> Option<&ConversionError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn pdf(name: &str) -> RawFile {
        RawFile::new(name, PDF_MIME_TYPE, b"%PDF-1.7\n".to_vec())
    }

    #[test]
    fn accepts_pdf_and_holds_it() {
        let mut intake = FileIntake::new();
        let c = intake.select(pdf("sample.pdf")).unwrap();
        assert_eq!(c.name(), "sample.pdf");
        assert_eq!(c.size_bytes(), 9);
        assert_eq!(intake.candidate().map(|c| c.name()), Some("sample.pdf"));
        assert!(intake.last_error().is_none());
    }

    #[test]
    fn rejects_every_non_pdf_type() {
        for mime in [
            "text/plain",
            "application/octet-stream",
            "image/png",
            "application/x-pdf",
            "APPLICATION/PDF",
            "application/pdf; charset=binary",
            "",
        ] {
            let mut intake = FileIntake::new();
            intake.select(pdf("held.pdf")).unwrap();

            let err = intake
                .select(RawFile::new("notes.txt", mime, b"hello".to_vec()))
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "mime {mime:?}");
            assert!(intake.candidate().is_none(), "mime {mime:?} left a candidate");
            assert_eq!(intake.last_error(), Some(&err));
        }
    }

    #[test]
    fn successful_select_clears_previous_error() {
        let mut intake = FileIntake::new();
        intake
            .select(RawFile::new("a.txt", "text/plain", vec![]))
            .unwrap_err();
        assert!(intake.last_error().is_some());
        intake.select(pdf("b.pdf")).unwrap();
        assert!(intake.last_error().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut intake = FileIntake::new();
        intake.select(pdf("a.pdf")).unwrap();
        intake.clear();
        intake.clear();
        assert!(intake.candidate().is_none());
    }

    #[test]
    fn sniff_prefers_magic_bytes_over_extension() {
        assert_eq!(sniff_mime_type(Path::new("scan.bin"), b"%PDF-1.4"), PDF_MIME_TYPE);
        assert_eq!(sniff_mime_type(Path::new("fake.pdf"), b"hello"), "application/octet-stream");
        assert_eq!(sniff_mime_type(Path::new("notes.TXT"), b"hello"), "text/plain");
    }

    #[tokio::test]
    async fn from_path_reads_and_sniffs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF-1.7 body").unwrap();

        let raw = RawFile::from_path(&path).await.unwrap();
        assert_eq!(raw.name, "invoice.pdf");
        assert_eq!(raw.mime_type, PDF_MIME_TYPE);
        assert_eq!(raw.content.len(), 13);
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = RawFile::from_path("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::FileNotFound { .. }), "got: {err}");
    }
}
