//! Turn a completed service response into an [`Artifact`] or a [`ConversionError`].
//!
//! Resolution is a pure function of the response and the original input name
//! (plus the blob store the artifact bytes are moved into). In particular the
//! output filename is derived in this order:
//!
//! 1. `filename*=` from `Content-Disposition` (RFC 5987, percent-decoded)
//! 2. `filename=` from `Content-Disposition`, quoted or unquoted
//! 3. the input name with its trailing `.pdf` replaced by `.xlsx`
//! 4. `converted.xlsx`

use crate::blob::BlobStore;
use crate::error::{ConversionError, FALLBACK_SERVER_MESSAGE};
use crate::state::Artifact;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Name used when neither the header nor the input name yields one.
pub const DEFAULT_OUTPUT_NAME: &str = "converted.xlsx";

/// Local file header signature of a ZIP container (every `.xlsx` is one).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// `filename*=charset'lang'value`
static EXTENDED_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|;)\s*filename\*\s*=\s*([^';]*)'[^']*'([^;]+)"#).unwrap());

/// `filename="x"`, `filename='x'` or `filename=x` (unquoted stops at `;`).
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"([^"]*)"|'([^']*)'|([^;\n]*))"#).unwrap()
});

/// A completed HTTP exchange, stripped down to what resolution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The only error body shape the service is trusted to send.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Interpret `response` for the conversion of `original_name`.
///
/// On success the body is moved into `store` and the returned artifact holds
/// the only handle to it.
pub fn resolve(
    response: ServiceResponse,
    original_name: &str,
    store: &BlobStore,
) -> Result<Artifact, ConversionError> {
    if !response.is_success() {
        let message = server_error_message(&response.body);
        warn!("Conversion service returned HTTP {}: {}", response.status, message);
        return Err(ConversionError::server(message));
    }

    if response.body.is_empty() {
        return Err(ConversionError::parse(
            "The conversion service returned an empty file",
        ));
    }
    if !response.body.starts_with(ZIP_MAGIC) {
        return Err(ConversionError::parse(
            "The conversion service response is not an Excel workbook",
        ));
    }

    let suggested_file_name =
        suggested_file_name(response.content_disposition.as_deref(), original_name);
    let size_bytes = response.body.len() as u64;
    let blob = store.create(response.body);
    debug!("Resolved artifact '{}' ({} bytes)", suggested_file_name, size_bytes);

    Ok(Artifact {
        blob,
        suggested_file_name,
        size_bytes,
    })
}

/// Message to show for a failed response body.
pub fn server_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error }) if !error.trim().is_empty() => error,
        _ => FALLBACK_SERVER_MESSAGE.to_string(),
    }
}

/// Output filename for a response with the given `Content-Disposition`.
pub fn suggested_file_name(content_disposition: Option<&str>, original_name: &str) -> String {
    content_disposition
        .and_then(filename_from_content_disposition)
        .or_else(|| xlsx_name_for(original_name))
        .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string())
}

/// Extract the filename parameter from a `Content-Disposition` value.
///
/// Returns `None` when the header carries no usable name.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    if let Some(caps) = EXTENDED_FILENAME_RE.captures(value) {
        let charset = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let encoded = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if charset.is_empty() || charset.eq_ignore_ascii_case("utf-8") {
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if let Some(name) = clean_file_name(&decoded) {
                    return Some(name);
                }
            }
        }
    }

    let caps = FILENAME_RE.captures(value)?;
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())?;
    clean_file_name(raw)
}

/// `invoice.pdf` → `invoice.xlsx`; `None` when there is no `.pdf` suffix.
pub fn xlsx_name_for(original_name: &str) -> Option<String> {
    let name = original_name.trim();
    let split = name.len().checked_sub(4)?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, ext) = name.split_at(split);
    if !ext.eq_ignore_ascii_case(".pdf") || stem.is_empty() {
        return None;
    }
    Some(format!("{stem}.xlsx"))
}

/// Strip quotes and whitespace, keep only the final path component.
fn clean_file_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    let last = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}
