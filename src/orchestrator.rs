//! The conversion state machine.
//!
//! [`Orchestrator`] owns the [`ConversionState`], the blob store holding the
//! current artifact, and the progress ticker of the running episode. Every
//! mutation goes through [`crate::state::reduce`] under a single mutex, from
//! either the request future or the ticker task.
//!
//! ## Episode lifecycle
//!
//! ```text
//! run(file)
//!  ├─ Begin     reject if already InFlight, release previous artifact, progress 0
//!  ├─ Ticker    every tick_interval: +[0, max_increment), capped at the ceiling
//!  ├─ Submit    POST the PDF, wait for the full response
//!  ├─ Resolve   status + Content-Disposition + body → Artifact | ConversionError
//!  ├─ Stop      abort the ticker
//!  └─ Settle    Succeeded | Failed, progress 100
//! ```
//!
//! Errors inside the episode never escape `run`; they end up in
//! [`ConversionState::Failed`]. Only *refusing* to start is reported to the
//! caller, as [`StartRejected`].

use crate::blob::{BlobHandle, BlobStore};
use crate::config::ClientConfig;
use crate::error::ConversionError;
use crate::intake::FileCandidate;
use crate::progress::{
    spawn_ticker, NoopProgressCallback, ProgressCallback, ProgressEstimator, TickControl,
    TickerGuard,
};
use crate::resolve::resolve;
use crate::state::{reduce, Artifact, ConversionState, EpisodeId, Event};
use crate::service::ConversionService;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why [`Orchestrator::run`] did not start an episode. The state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartRejected {
    /// No file is selected.
    #[error("no PDF file is selected")]
    NoFile,
    /// Another episode has not finished yet.
    #[error("a conversion is already in progress")]
    AlreadyInFlight,
}

/// Drives conversion episodes against a [`ConversionService`].
pub struct Orchestrator<S> {
    service: S,
    config: ClientConfig,
    store: BlobStore,
    state: Arc<Mutex<ConversionState>>,
    next_episode: AtomicU64,
    callback: ProgressCallback,
}

impl<S: ConversionService> Orchestrator<S> {
    /// Invalid progress settings in `config` fall back to their defaults.
    pub fn new(service: S, config: ClientConfig) -> Self {
        Self {
            service,
            config: config.with_valid_progress(),
            store: BlobStore::new(),
            state: Arc::new(Mutex::new(ConversionState::Idle)),
            next_episode: AtomicU64::new(0),
            callback: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ConversionState {
        lock_state(&self.state).clone()
    }

    /// Current progress sample: 0 when idle, 100 once an episode has ended.
    pub fn progress(&self) -> f64 {
        lock_state(&self.state).progress()
    }

    /// Store holding the bytes of the current artifact.
    pub fn blob_store(&self) -> &BlobStore {
        &self.store
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run one conversion episode for `candidate` and return its terminal state.
    ///
    /// Returns `Err` without touching the state when no file is given or an
    /// episode is already running.
    pub async fn run(
        &self,
        candidate: Option<&FileCandidate>,
    ) -> Result<ConversionState, StartRejected> {
        let Some(file) = candidate else {
            debug!("Convert requested with no file selected; ignoring");
            return Err(StartRejected::NoFile);
        };

        let episode = EpisodeId(self.next_episode.fetch_add(1, Ordering::Relaxed) + 1);
        {
            let mut state = lock_state(&self.state);
            let r = reduce(
                &mut state,
                Event::Begin {
                    episode,
                    started_at: Instant::now(),
                },
            );
            if !r.applied {
                warn!(
                    "Rejected start of episode {} for '{}': another conversion is in flight",
                    episode,
                    file.name()
                );
                return Err(StartRejected::AlreadyInFlight);
            }
            self.release(r.release);
            self.callback
                .on_conversion_start(file.name(), file.size_bytes());
            self.callback.on_progress(0.0);
        }
        info!("Episode {}: converting '{}'", episode, file.name());

        let mut pending = PendingEpisode {
            orchestrator: self,
            episode,
            ticker: self.start_ticker(episode),
            settled: false,
        };

        let outcome = match self.service.submit(file).await {
            Ok(response) => resolve(response, file.name(), &self.store),
            Err(e) => Err(e),
        };

        Ok(pending.settle(outcome))
    }

    /// Discard a finished result and return to `Idle`.
    ///
    /// Releases the artifact's blob. A no-op from `Idle`; ignored while an
    /// episode is in flight.
    pub fn reset(&self) {
        let mut state = lock_state(&self.state);
        let was_in_flight = state.is_in_flight();
        let r = reduce(&mut state, Event::Reset);
        self.release(r.release);
        if r.applied {
            info!("Conversion state reset");
        } else if was_in_flight {
            warn!("Reset ignored: a conversion is in flight");
        }
    }

    fn start_ticker(&self, episode: EpisodeId) -> TickerGuard {
        let estimator = ProgressEstimator::new(self.config.max_increment);
        let ceiling = self.config.progress_ceiling;
        let state = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);

        spawn_ticker(self.config.tick_interval(), estimator, move |increment| {
            let mut state = lock_state(&state);
            let r = reduce(
                &mut state,
                Event::Tick {
                    episode,
                    increment,
                    ceiling,
                },
            );
            if !r.applied {
                debug!("Dropping stale tick for episode {}", episode);
                return TickControl::Stop;
            }
            callback.on_progress(state.progress());
            TickControl::Continue
        })
    }

    fn settle(
        &self,
        episode: EpisodeId,
        outcome: Result<Artifact, ConversionError>,
    ) -> ConversionState {
        let mut state = lock_state(&self.state);
        let r = reduce(&mut state, Event::Settle { episode, outcome });
        self.release(r.release);
        if r.applied {
            match &*state {
                ConversionState::Succeeded { artifact } => {
                    info!(
                        "Episode {}: produced '{}' ({} bytes)",
                        episode, artifact.suggested_file_name, artifact.size_bytes
                    );
                    self.callback.on_progress(state.progress());
                    self.callback.on_conversion_succeeded(artifact);
                }
                ConversionState::Failed { error } => {
                    warn!("Episode {}: {:?} error: {}", episode, error.kind, error.message);
                    self.callback.on_progress(state.progress());
                    self.callback.on_conversion_failed(error);
                }
                _ => {}
            }
        } else {
            warn!("Episode {} settled after being superseded; result dropped", episode);
        }
        state.clone()
    }

    fn release(&self, blob: Option<BlobHandle>) {
        if let Some(blob) = blob {
            self.store.revoke(&blob);
        }
    }
}

impl<S> Drop for Orchestrator<S> {
    fn drop(&mut self) {
        if let Some(artifact) = lock_state(&self.state).artifact() {
            self.store.revoke(&artifact.blob);
        }
    }
}

/// The running part of an episode.
///
/// If `run` is dropped before the service answers, the episode is settled as
/// a `Network` failure here so the orchestrator does not stay `InFlight`.
struct PendingEpisode<'a, S: ConversionService> {
    orchestrator: &'a Orchestrator<S>,
    episode: EpisodeId,
    ticker: TickerGuard,
    settled: bool,
}

impl<S: ConversionService> PendingEpisode<'_, S> {
    fn settle(&mut self, outcome: Result<Artifact, ConversionError>) -> ConversionState {
        // The ticker must be gone before progress is forced to 100.
        self.ticker.stop();
        self.settled = true;
        self.orchestrator.settle(self.episode, outcome)
    }
}

impl<S: ConversionService> Drop for PendingEpisode<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Episode {} interrupted before the service answered", self.episode);
            self.settle(Err(ConversionError::network(
                "The conversion was interrupted before the service answered",
            )));
        }
    }
}

fn lock_state(state: &Mutex<ConversionState>) -> MutexGuard<'_, ConversionState> {
    // Every critical section leaves the state valid, so a poisoned lock is still usable.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::intake::{FileIntake, RawFile, PDF_MIME_TYPE};
    use crate::resolve::ServiceResponse;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const XLSX: &[u8] = b"PK\x03\x04workbook";

    /// Service whose answers are handed over by the test through a channel.
    struct ScriptedService {
        replies: Mutex<Vec<oneshot::Receiver<Result<ServiceResponse, ConversionError>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn new(n: usize) -> (Self, Vec<oneshot::Sender<Result<ServiceResponse, ConversionError>>>) {
            let mut senders = Vec::new();
            let mut receivers = Vec::new();
            for _ in 0..n {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                receivers.push(rx);
            }
            receivers.reverse();
            let svc = Self {
                replies: Mutex::new(receivers),
                calls: AtomicUsize::new(0),
            };
            (svc, senders)
        }
    }

    impl ConversionService for ScriptedService {
        async fn submit(&self, _file: &FileCandidate) -> Result<ServiceResponse, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rx = self.replies.lock().unwrap().pop().expect("unscripted call");
            rx.await
                .unwrap_or_else(|_| Err(ConversionError::network("script dropped")))
        }
    }

    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<f64>>,
        succeeded: AtomicUsize,
        failed: AtomicUsize,
    }

    impl crate::progress::ConversionProgressCallback for Recorder {
        fn on_progress(&self, percent: f64) {
            self.samples.lock().unwrap().push(percent);
        }
        fn on_conversion_succeeded(&self, _artifact: &Artifact) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
        fn on_conversion_failed(&self, _error: &ConversionError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn candidate(name: &str) -> FileCandidate {
        FileIntake::new()
            .select(RawFile::new(name, PDF_MIME_TYPE, b"%PDF-1.7".to_vec()))
            .unwrap()
    }

    fn xlsx_reply(name: &str) -> Result<ServiceResponse, ConversionError> {
        Ok(ServiceResponse {
            status: 200,
            content_disposition: Some(format!("attachment; filename=\"{name}\"")),
            body: XLSX.to_vec(),
        })
    }

    fn orchestrator(svc: ScriptedService) -> Arc<Orchestrator<ScriptedService>> {
        Arc::new(Orchestrator::new(svc, ClientConfig::default()))
    }

    #[tokio::test]
    async fn run_without_file_is_a_noop() {
        let (svc, _tx) = ScriptedService::new(0);
        let orch = orchestrator(svc);
        assert_eq!(orch.run(None).await.unwrap_err(), StartRejected::NoFile);
        assert!(matches!(orch.state(), ConversionState::Idle));
        assert_eq!(orch.service().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unvalidated_config_still_drives_progress() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "base_url": "http://localhost:5000",
            "field_name": "file",
            "request_timeout_secs": 300,
            "connect_timeout_secs": 10,
            "tick_interval_ms": 0,
            "progress_ceiling": 90.0,
            "max_increment": 0.0
        }))
        .unwrap();
        let (svc, mut tx) = ScriptedService::new(1);
        let orch = Arc::new(Orchestrator::new(svc, config));

        let task = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run(Some(&candidate("sample.pdf"))).await })
        };

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        let mid = orch.progress();
        assert!(mid > 0.0 && mid <= 90.0, "pending progress {mid}");

        tx.remove(0).send(xlsx_reply("out.xlsx")).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(orch.progress(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_then_exactly_100() {
        let (svc, mut tx) = ScriptedService::new(1);
        let recorder = Arc::new(Recorder::default());
        let orch = Arc::new(
            Orchestrator::new(svc, ClientConfig::default())
                .with_progress_callback(recorder.clone()),
        );

        let task = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run(Some(&candidate("sample.pdf"))).await })
        };

        tokio::time::sleep(Duration::from_millis(2_600)).await;
        assert!(orch.state().is_in_flight());
        let mid = orch.progress();
        assert!(mid < 100.0 && mid <= 90.0, "pending progress {mid}");

        tx.remove(0).send(xlsx_reply("out.xlsx")).unwrap();
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.artifact().unwrap().suggested_file_name, "out.xlsx");
        assert_eq!(orch.progress(), 100.0);

        // Ticker is gone: no sample after the terminal one.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let samples = recorder.samples.lock().unwrap().clone();
        assert_eq!(samples.first(), Some(&0.0));
        assert_eq!(samples.last(), Some(&100.0));
        assert!(samples.len() >= 3, "expected ticks, got {samples:?}");
        let (last, pending) = samples.split_last().unwrap();
        assert_eq!(*last, 100.0);
        assert!(pending.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
        assert!(pending.iter().all(|p| *p <= 90.0), "{samples:?}");
        assert_eq!(recorder.succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_in_flight_is_rejected() {
        let (svc, mut tx) = ScriptedService::new(1);
        let orch = orchestrator(svc);
        let file = candidate("sample.pdf");

        let first = {
            let orch = Arc::clone(&orch);
            let file = file.clone();
            tokio::spawn(async move { orch.run(Some(&file)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let episode = orch.state().episode();
        assert!(episode.is_some());

        for _ in 0..3 {
            assert_eq!(
                orch.run(Some(&file)).await.unwrap_err(),
                StartRejected::AlreadyInFlight
            );
            assert_eq!(orch.state().episode(), episode);
        }

        tx.remove(0).send(xlsx_reply("out.xlsx")).unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(orch.service().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_failure_becomes_failed_state() {
        let (svc, mut tx) = ScriptedService::new(1);
        let orch = orchestrator(svc);
        tx.remove(0)
            .send(Err(ConversionError::network("connection refused")))
            .unwrap();
        let state = orch.run(Some(&candidate("a.pdf"))).await.unwrap();
        assert_eq!(state.error().unwrap().kind, ErrorKind::Network);
        assert_eq!(orch.progress(), 100.0);
    }

    #[tokio::test]
    async fn new_episode_and_reset_release_previous_blob() {
        let (svc, mut tx) = ScriptedService::new(2);
        let orch = orchestrator(svc);
        let file = candidate("a.pdf");

        tx.remove(0).send(xlsx_reply("one.xlsx")).unwrap();
        let first = orch.run(Some(&file)).await.unwrap();
        let first_blob = first.artifact().unwrap().blob.clone();
        assert_eq!(orch.blob_store().live_count(), 1);

        tx.remove(0).send(xlsx_reply("two.xlsx")).unwrap();
        orch.run(Some(&file)).await.unwrap();
        assert!(!orch.blob_store().is_live(&first_blob));
        assert_eq!(orch.blob_store().live_count(), 1);

        orch.reset();
        assert!(matches!(orch.state(), ConversionState::Idle));
        assert_eq!(orch.progress(), 0.0);
        assert_eq!(orch.blob_store().live_count(), 0);
    }

    #[tokio::test]
    async fn dropping_run_settles_episode() {
        let (svc, _tx) = ScriptedService::new(1);
        let orch = orchestrator(svc);
        let file = candidate("a.pdf");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), orch.run(Some(&file))).await;
        assert!(timed_out.is_err());

        let state = orch.state();
        assert_eq!(state.error().unwrap().kind, ErrorKind::Network);
        assert_eq!(orch.progress(), 100.0);
    }

    #[tokio::test]
    async fn drop_releases_artifact() {
        let (svc, mut tx) = ScriptedService::new(1);
        let orch = Orchestrator::new(svc, ClientConfig::default());
        tx.remove(0).send(xlsx_reply("x.xlsx")).unwrap();
        orch.run(Some(&candidate("a.pdf"))).await.unwrap();
        let store = orch.blob_store().clone();
        assert_eq!(store.live_count(), 1);
        drop(orch);
        assert_eq!(store.live_count(), 0);
    }
}
