//! Scan lifecycle: a worker drives the walk and streams events to a handle.
//!
//! The worker runs on Tokio's blocking pool and pushes [`ScanEvent`]s into a
//! bounded channel. A full channel suspends the worker, so memory stays at
//! O(capacity) however large the tree is. Cancellation is cooperative and is
//! observed between two entries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::filter::{FilterStep, MetadataFilter};
use super::rate::RateMeter;
use super::walker::PathWalker;
use super::{
    CoreError, InvalidRequest, ScanEvent, ScanOutcome, ScanProgress, ScanRequest, SessionState,
};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const PROGRESS_UPDATE_INTERVAL: u64 = 25; // Entries between progress events
pub const DEFAULT_MAX_RECORDED_ERRORS: usize = 32;

/// Tunables of a session that are not part of the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub channel_capacity: usize,
    pub progress_interval: u64,
    pub max_recorded_errors: usize,
    /// Walk the tree once up front so progress carries a total, a percentage
    /// and an ETA. Only the count is kept.
    pub count_entries: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            max_recorded_errors: DEFAULT_MAX_RECORDED_ERRORS,
            count_entries: false,
        }
    }
}

/// Starts a scan with default options. See [`start_scan_with`].
pub fn start_scan(request: ScanRequest) -> Result<SessionHandle, CoreError> {
    start_scan_with(request, SessionOptions::default())
}

/// Validates `request` and spawns its worker.
///
/// Fails synchronously with [`CoreError::InvalidRequest`] if the root is
/// missing or not a directory. A root that exists but cannot be listed ends
/// the session in [`ScanOutcome::Failed`] instead.
///
/// # Panics
///
/// Must be called from within a Tokio runtime.
pub fn start_scan_with(
    request: ScanRequest,
    options: SessionOptions,
) -> Result<SessionHandle, CoreError> {
    let request = validate(request, &options)?;
    let (session, handle) = ScanSession::new(request, options);
    Ok(session.spawn(handle))
}

fn validate(request: ScanRequest, options: &SessionOptions) -> Result<ScanRequest, CoreError> {
    if options.channel_capacity == 0 {
        return Err(InvalidRequest::ZeroChannelCapacity.into());
    }

    let root = request.root_path().to_path_buf();
    match fs::metadata(&root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(InvalidRequest::NotADirectory(root).into()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InvalidRequest::RootNotFound(root).into());
        }
        // Anything else surfaces as a fatal root error once the worker runs.
        Err(e) => tracing::debug!("Cannot stat scan root {}: {}", root.display(), e),
    }

    let absolute = fs::canonicalize(&root)
        .or_else(|_| std::path::absolute(&root))
        .unwrap_or(root);
    Ok(request.with_root(absolute))
}

/// Worker side of a session. Owns the progress counters exclusively.
struct ScanSession {
    request: ScanRequest,
    options: SessionOptions,
    progress: ScanProgress,
    events: mpsc::Sender<ScanEvent>,
    snapshots: watch::Sender<ScanProgress>,
    cancel_flag: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    meter: RateMeter,
}

impl ScanSession {
    fn new(request: ScanRequest, options: SessionOptions) -> (Self, SessionHandle) {
        let (event_tx, event_rx) = mpsc::channel(options.channel_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(ScanProgress::default());
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(SessionState::Idle as u8));

        let handle = SessionHandle {
            root: request.root_path().to_path_buf(),
            events: event_rx,
            snapshots: snapshot_rx,
            cancel_flag: cancel_flag.clone(),
            state: state.clone(),
            worker: None,
            finished: false,
        };
        let session = Self {
            request,
            options,
            progress: ScanProgress::default(),
            events: event_tx,
            snapshots: snapshot_tx,
            cancel_flag,
            state,
            meter: RateMeter::new(Instant::now()),
        };
        (session, handle)
    }

    fn spawn(self, mut handle: SessionHandle) -> SessionHandle {
        self.state
            .store(SessionState::Running as u8, Ordering::Release);
        handle.worker = Some(tokio::task::spawn_blocking(move || self.run()));
        handle
    }

    fn run(mut self) -> ScanOutcome {
        let root = self.request.root_path().to_path_buf();
        tracing::info!(
            "Scan started in {} (threshold {} bytes, hidden: {})",
            root.display(),
            self.request.threshold_bytes(),
            self.request.include_hidden()
        );
        self.meter = RateMeter::new(Instant::now());
        self.progress.started_at = Some(Utc::now());

        if let Err(source) = fs::read_dir(&root) {
            let cause = CoreError::FatalRoot { path: root, source };
            return self.finish(ScanOutcome::Failed {
                cause: cause.to_string(),
            });
        }

        if self.options.count_entries {
            match self.count_entries(&root) {
                Some(total) => {
                    tracing::debug!("Counted {} entries under {}", total, root.display());
                    self.progress.total_entries = Some(total);
                    if !self.publish_progress() {
                        return self.abandon();
                    }
                }
                None => return self.finish(ScanOutcome::Cancelled { qualifying_found: 0 }),
            }
        }

        let interval = self.options.progress_interval.max(1);
        let mut steps = MetadataFilter::new(
            PathWalker::new(&root, self.request.include_hidden()),
            self.request.threshold_bytes(),
        );

        loop {
            if self.cancel_flag.load(Ordering::Acquire) {
                let qualifying_found = self.progress.qualifying_found;
                return self.finish(ScanOutcome::Cancelled { qualifying_found });
            }

            let Some(step) = steps.next() else {
                break;
            };
            self.progress.record_visit(step.path());

            match step {
                FilterStep::Qualifying(file) => {
                    self.progress.qualifying_found += 1;
                    if !self.emit(ScanEvent::File(file)) {
                        return self.abandon();
                    }
                }
                FilterStep::Failed(error) => {
                    tracing::warn!(
                        "Skipping unreadable entry {}: {}",
                        error.path.display(),
                        error.message
                    );
                    self.progress
                        .record_error(error, self.options.max_recorded_errors);
                }
                FilterStep::BelowThreshold(_) | FilterStep::NotAFile(_) => {}
            }

            if self.progress.entries_visited % interval == 0 && !self.publish_progress() {
                return self.abandon();
            }
        }

        let outcome = ScanOutcome::Completed {
            total_qualifying: self.progress.qualifying_found,
            entry_errors: self.progress.entry_errors,
        };
        self.finish(outcome)
    }

    /// Walks the tree without measuring anything. Returns `None` if the
    /// scan is cancelled meanwhile.
    fn count_entries(&self, root: &Path) -> Option<u64> {
        let mut total = 0u64;
        for _ in PathWalker::new(root, self.request.include_hidden()) {
            if self.cancel_flag.load(Ordering::Acquire) {
                return None;
            }
            total += 1;
        }
        Some(total)
    }

    /// Pushes one event, suspending while the channel is full.
    /// Returns `false` once the consumer has gone away.
    fn emit(&self, event: ScanEvent) -> bool {
        self.events.blocking_send(event).is_ok()
    }

    fn publish_progress(&mut self) -> bool {
        let now = Instant::now();
        self.progress.elapsed_ms =
            u64::try_from(self.meter.elapsed(now).as_millis()).unwrap_or(u64::MAX);
        self.progress.entries_per_sec = self.meter.observe(self.progress.entries_visited, now);
        tracing::debug!(
            "Progress: {} visited, {} qualifying, {} skipped",
            self.progress.entries_visited,
            self.progress.qualifying_found,
            self.progress.entry_errors
        );
        self.snapshots.send_replace(self.progress.clone());
        self.emit(ScanEvent::Progress(self.progress.clone()))
    }

    // Consumes the session, so a terminal outcome can be produced only once.
    fn finish(mut self, outcome: ScanOutcome) -> ScanOutcome {
        // The final snapshot and the outcome are best effort: the consumer may be gone.
        let _ = self.publish_progress();
        self.state
            .store(SessionState::from(&outcome) as u8, Ordering::Release);
        match &outcome {
            ScanOutcome::Completed {
                total_qualifying,
                entry_errors,
            } => tracing::info!(
                "Scan completed: {} qualifying files, {} entries skipped",
                total_qualifying,
                entry_errors
            ),
            ScanOutcome::Cancelled { qualifying_found } => tracing::info!(
                "Scan cancelled after {} entries ({} qualifying)",
                self.progress.entries_visited,
                qualifying_found
            ),
            ScanOutcome::Failed { cause } => tracing::error!("Scan failed: {}", cause),
        }
        let _ = self.emit(ScanEvent::Finished(outcome.clone()));
        outcome
    }

    fn abandon(self) -> ScanOutcome {
        tracing::info!("Scan consumer went away; stopping worker");
        self.snapshots.send_replace(self.progress.clone());
        self.state
            .store(SessionState::Cancelled as u8, Ordering::Release);
        ScanOutcome::Cancelled {
            qualifying_found: self.progress.qualifying_found,
        }
    }
}

/// Consumer side of a session.
///
/// Dropping the handle cancels the scan.
pub struct SessionHandle {
    root: PathBuf,
    events: mpsc::Receiver<ScanEvent>,
    snapshots: watch::Receiver<ScanProgress>,
    cancel_flag: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    worker: Option<JoinHandle<ScanOutcome>>,
    finished: bool,
}

impl SessionHandle {
    /// Waits for the next event. Returns `None` once the terminal
    /// [`ScanEvent::Finished`] has been delivered or the worker is gone.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        while !self.finished {
            let event = self.events.recv().await?;
            if let Some(event) = self.admit(event) {
                return Some(event);
            }
        }
        None
    }

    /// Blocking variant of [`SessionHandle::next_event`] for consumers outside
    /// of an async context.
    pub fn blocking_next_event(&mut self) -> Option<ScanEvent> {
        while !self.finished {
            let event = self.events.blocking_recv()?;
            if let Some(event) = self.admit(event) {
                return Some(event);
            }
        }
        None
    }

    // After cancel() only the outcome gets through; buffered files are dropped.
    fn admit(&mut self, event: ScanEvent) -> Option<ScanEvent> {
        match event {
            ScanEvent::Finished(_) => {
                self.finished = true;
                Some(event)
            }
            _ if self.cancel_flag.load(Ordering::Acquire) => None,
            other => Some(other),
        }
    }

    /// Requests cooperative cancellation. Idempotent; ignored once terminal.
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// A cloneable handle that can cancel this session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            root: self.root.clone(),
            cancel_flag: self.cancel_flag.clone(),
            state: self.state.clone(),
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_flag.load(Ordering::Acquire)
    }

    /// A copy of the latest progress published by the worker.
    pub fn progress(&self) -> ScanProgress {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The canonical root being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drains the remaining events and returns the terminal outcome.
    pub async fn wait(mut self) -> Result<ScanOutcome, CoreError> {
        while self.next_event().await.is_some() {}
        match self.worker.take() {
            Some(worker) => Ok(worker.await?),
            None => Ok(ScanOutcome::Cancelled {
                qualifying_found: self.progress().qualifying_found,
            }),
        }
    }
}

/// Cancels a session without borrowing its [`SessionHandle`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    root: PathBuf,
    cancel_flag: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if SessionState::from_u8(self.state.load(Ordering::Acquire)).is_terminal() {
            return;
        }
        if !self.cancel_flag.swap(true, Ordering::AcqRel) {
            tracing::info!("Cancellation requested for scan of {}", self.root.display());
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            self.cancel_flag.store(true, Ordering::Release);
        }
    }
}
