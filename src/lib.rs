//! # edgequake-pdf2xlsx
//!
//! Convert the tables of a PDF into an Excel workbook through a remote
//! conversion service.
//!
//! The service does the table extraction; this crate is the client side:
//! it validates the input, runs exactly one conversion at a time, keeps the
//! user informed with a synthetic progress signal while the service works,
//! interprets the response, and hands back a spreadsheet ready to save.
//!
//! ## Episode Overview
//!
//! ```text
//! RawFile
//!  │
//!  ├─ 1. Intake    accept only application/pdf            (intake)
//!  ├─ 2. Begin     Idle/Succeeded/Failed → InFlight         (orchestrator)
//!  ├─ 3. Ticker    +[0,10) every 500 ms, capped at 90       (progress)
//!  ├─ 4. Submit    POST /api/convert, multipart `file`      (service)
//!  ├─ 5. Resolve   status, Content-Disposition, body        (resolve)
//!  ├─ 6. Settle    Succeeded | Failed, progress 100         (state)
//!  └─ 7. Save      atomic write under the suggested name    (download)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2xlsx::{ClientConfig, HttpConversionService, RawFile, Session, UserIntent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Base URL from PDF2XLSX_API_URL, defaults to http://localhost:5000
//!     let config = ClientConfig::from_env()?;
//!     let service = HttpConversionService::new(&config)?;
//!     let mut session = Session::new(service, config, ".");
//!
//!     session.dispatch(UserIntent::FileSelected(RawFile::from_path("invoice.pdf").await?)).await;
//!     let view = session.dispatch(UserIntent::ConvertRequested).await;
//!     if let Some(error) = view.state.error() {
//!         eprintln!("conversion failed: {error}");
//!     } else {
//!         let view = session.dispatch(UserIntent::DownloadRequested).await;
//!         println!("saved to {:?}", view.saved_to);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod blob;
pub mod config;
pub mod download;
pub mod error;
pub mod intake;
pub mod orchestrator;
pub mod progress;
pub mod resolve;
pub mod service;
pub mod session;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use blob::{BlobHandle, BlobStore};
pub use config::{ClientConfig, ClientConfigBuilder, API_URL_ENV};
pub use download::DownloadTrigger;
pub use error::{ConversionError, ErrorKind, Pdf2XlsxError};
pub use intake::{FileCandidate, FileIntake, RawFile, PDF_MIME_TYPE};
pub use orchestrator::{Orchestrator, StartRejected};
pub use progress::{
    ConversionProgressCallback, NoopProgressCallback, ProgressCallback, ProgressEstimator,
};
pub use resolve::{resolve, suggested_file_name, ServiceResponse};
pub use service::{ConversionService, HttpConversionService};
pub use session::{SelectedFile, Session, SessionView, UserIntent};
pub use state::{Artifact, ConversionState, EpisodeId};
