//! Conversion lifecycle state and its reducer.
//!
//! Everything that can change the state (an episode starting, a progress
//! tick, the service answering, the user resetting) is an [`Event`] fed to
//! [`reduce`]. Events that belong to an episode carry its [`EpisodeId`]; an
//! event for any episode other than the current one is ignored, so a late
//! tick or a response from a superseded attempt can never overwrite newer
//! state.
//!
//! ```text
//!            Begin                 Settle(Ok)
//!   Idle ───────────▶ InFlight ─────────────▶ Succeeded
//!    ▲                 │  ▲ Tick                 │
//!    │                 │  └──┘                   │
//!    │                 │ Settle(Err)             │
//!    │                 ▼                         │
//!    └──── Reset ──── Failed ◀── Begin from ─────┘
//!                       │        Succeeded/Failed re-enters InFlight
//! ```

use crate::blob::BlobHandle;
use crate::error::ConversionError;
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Identifies one conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EpisodeId(pub u64);

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The converted spreadsheet plus the name it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    #[serde(skip)]
    pub blob: BlobHandle,
    pub suggested_file_name: String,
    pub size_bytes: u64,
}

/// The orchestrator's entire externally observable memory.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionState {
    /// No episode running and no result held.
    #[default]
    Idle,
    /// A request is outstanding.
    InFlight {
        episode: EpisodeId,
        #[serde(skip)]
        started_at: Instant,
        progress_percent: f64,
    },
    /// Terminal until reset or a new episode starts.
    Succeeded { artifact: Artifact },
    /// Terminal until reset or a new episode starts.
    Failed { error: ConversionError },
}

impl ConversionState {
    /// The progress sample implied by this state.
    ///
    /// Idle reads as 0; both terminal states read as exactly 100.
    pub fn progress(&self) -> f64 {
        match self {
            ConversionState::Idle => 0.0,
            ConversionState::InFlight {
                progress_percent, ..
            } => *progress_percent,
            ConversionState::Succeeded { .. } | ConversionState::Failed { .. } => 100.0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ConversionState::InFlight { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionState::Succeeded { .. } | ConversionState::Failed { .. }
        )
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            ConversionState::Succeeded { artifact } => Some(artifact),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match self {
            ConversionState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn episode(&self) -> Option<EpisodeId> {
        match self {
            ConversionState::InFlight { episode, .. } => Some(*episode),
            _ => None,
        }
    }
}

/// Inputs to [`reduce`].
#[derive(Debug)]
pub enum Event {
    /// A new episode wants to start.
    Begin {
        episode: EpisodeId,
        started_at: Instant,
    },
    /// The progress ticker fired.
    Tick {
        episode: EpisodeId,
        increment: f64,
        ceiling: f64,
    },
    /// The episode finished, one way or the other.
    Settle {
        episode: EpisodeId,
        outcome: Result<Artifact, ConversionError>,
    },
    /// The user discarded the result.
    Reset,
}

/// What [`reduce`] did with an event.
#[derive(Debug, Default, PartialEq)]
pub struct Reduction {
    /// The event changed the state.
    pub applied: bool,
    /// A blob that is no longer referenced and must be revoked by the caller.
    pub release: Option<BlobHandle>,
}

impl Reduction {
    fn applied(release: Option<BlobHandle>) -> Self {
        Self {
            applied: true,
            release,
        }
    }

    fn ignored(release: Option<BlobHandle>) -> Self {
        Self {
            applied: false,
            release,
        }
    }
}

/// Apply `event` to `state`.
///
/// Pure apart from mutating `state`: no I/O, no clocks, no blob store access.
/// Any artifact the transition drops is handed back in
/// [`Reduction::release`] for the caller to revoke.
pub fn reduce(state: &mut ConversionState, event: Event) -> Reduction {
    match event {
        Event::Begin {
            episode,
            started_at,
        } => {
            if state.is_in_flight() {
                return Reduction::ignored(None);
            }
            let previous = std::mem::replace(
                state,
                ConversionState::InFlight {
                    episode,
                    started_at,
                    progress_percent: 0.0,
                },
            );
            Reduction::applied(into_blob(previous))
        }

        Event::Tick {
            episode,
            increment,
            ceiling,
        } => match state {
            ConversionState::InFlight {
                episode: current,
                progress_percent,
                ..
            } if *current == episode => {
                let next = (*progress_percent + increment.max(0.0)).min(ceiling);
                // A ceiling below the current value must not move progress backwards.
                *progress_percent = next.max(*progress_percent);
                Reduction::applied(None)
            }
            _ => Reduction::ignored(None),
        },

        Event::Settle { episode, outcome } => {
            if state.episode() != Some(episode) {
                let orphan = outcome.ok().map(|a| a.blob);
                return Reduction::ignored(orphan);
            }
            *state = match outcome {
                Ok(artifact) => ConversionState::Succeeded { artifact },
                Err(error) => ConversionState::Failed { error },
            };
            Reduction::applied(None)
        }

        Event::Reset => {
            if !state.is_terminal() {
                return Reduction::ignored(None);
            }
            let previous = std::mem::take(state);
            Reduction::applied(into_blob(previous))
        }
    }
}

fn into_blob(state: ConversionState) -> Option<BlobHandle> {
    match state {
        ConversionState::Succeeded { artifact } => Some(artifact.blob),
        _ => None,
    }
}
