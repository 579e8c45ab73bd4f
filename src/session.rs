//! Presentation-facing facade.
//!
//! A [`Session`] wires [`FileIntake`], [`Orchestrator`] and
//! [`DownloadTrigger`] together behind the five user intents a front end can
//! raise. After each intent it returns a [`SessionView`] with everything
//! needed to render the screen; no business rule lives in the caller.

use crate::config::ClientConfig;
use crate::download::DownloadTrigger;
use crate::error::ConversionError;
use crate::intake::{FileIntake, RawFile};
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressCallback;
use crate::service::ConversionService;
use crate::state::ConversionState;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error};

/// What the user asked for.
#[derive(Debug)]
pub enum UserIntent {
    FileSelected(RawFile),
    FileDropped(RawFile),
    RemoveRequested,
    ConvertRequested,
    DownloadRequested,
}

/// Selected file as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    pub name: String,
    pub size_bytes: u64,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub file: Option<SelectedFile>,
    pub selection_error: Option<ConversionError>,
    pub state: ConversionState,
    pub progress: f64,
    /// Set when the last intent was a convert request that did not start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
    /// Set when the last intent saved a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

/// One user's conversion session.
pub struct Session<S> {
    intake: FileIntake,
    orchestrator: Orchestrator<S>,
    download: DownloadTrigger,
}

impl<S: ConversionService> Session<S> {
    pub fn new(service: S, config: ClientConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self::from_orchestrator(Orchestrator::new(service, config), output_dir)
    }

    pub fn with_progress_callback(
        service: S,
        config: ClientConfig,
        output_dir: impl Into<PathBuf>,
        callback: ProgressCallback,
    ) -> Self {
        Self::from_orchestrator(
            Orchestrator::new(service, config).with_progress_callback(callback),
            output_dir,
        )
    }

    fn from_orchestrator(orchestrator: Orchestrator<S>, output_dir: impl Into<PathBuf>) -> Self {
        let download = DownloadTrigger::new(orchestrator.blob_store().clone(), output_dir);
        Self {
            intake: FileIntake::new(),
            orchestrator,
            download,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    pub fn intake(&self) -> &FileIntake {
        &self.intake
    }

    /// Apply one user intent and return the resulting view.
    pub async fn dispatch(&mut self, intent: UserIntent) -> SessionView {
        debug!("Dispatching {}", intent_name(&intent));
        let mut rejected = None;
        let mut saved_to = None;

        match intent {
            UserIntent::FileSelected(raw) | UserIntent::FileDropped(raw) => {
                // A rejected file is recorded in the intake and rendered from there.
                let _ = self.intake.select(raw);
            }
            UserIntent::RemoveRequested => {
                self.intake.clear();
                self.orchestrator.reset();
            }
            UserIntent::ConvertRequested => {
                if let Err(e) = self.orchestrator.run(self.intake.candidate()).await {
                    rejected = Some(e.to_string());
                }
            }
            UserIntent::DownloadRequested => {
                if let Some(artifact) = self.orchestrator.state().artifact() {
                    match self.download.try_save(artifact) {
                        Ok(path) => saved_to = Some(path),
                        Err(e) => error!("Download failed: {}", e),
                    }
                } else {
                    self.download.save(None);
                }
            }
        }

        let mut view = self.view();
        view.rejected = rejected;
        view.saved_to = saved_to;
        view
    }

    /// The current view without applying an intent.
    pub fn view(&self) -> SessionView {
        let state = self.orchestrator.state();
        SessionView {
            file: self.intake.candidate().map(|c| SelectedFile {
                name: c.name().to_string(),
                size_bytes: c.size_bytes(),
            }),
            selection_error: self.intake.last_error().cloned(),
            progress: state.progress(),
            state,
            rejected: None,
            saved_to: None,
        }
    }
}

fn intent_name(intent: &UserIntent) -> &'static str {
    match intent {
        UserIntent::FileSelected(_) => "file-selected",
        UserIntent::FileDropped(_) => "file-dropped",
        UserIntent::RemoveRequested => "remove-requested",
        UserIntent::ConvertRequested => "convert-requested",
        UserIntent::DownloadRequested => "download-requested",
    }
}
