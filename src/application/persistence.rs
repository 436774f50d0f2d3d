//! Debounced persistence of cooldown state.
//!
//! Cooldown grants only flip a dirty flag and wake the worker; the hot path
//! never touches the disk. The worker waits a short coalescing interval so a
//! burst of grants collapses into one whole-file write, then snapshots the
//! tracker and saves on the blocking pool.
//!
//! ```text
//!   admit_pair ──mark_dirty──▶ MutationSignal ──notify──▶ worker task
//!                                                         │ wait(coalesce)
//!                                                         │ snapshot()
//!                                                         ▼
//!                                               spawn_blocking(store.save)
//! ```

use crate::application::cooldown::{CooldownState, CooldownTracker};
use crate::application::ports::{CooldownStore, PersistenceError, Storage};
use crate::domain::identity::CooldownKey;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default coalescing interval between a mutation and its write.
pub const DEFAULT_COALESCE: Duration = Duration::from_millis(50);

/// Dirty flag plus wake-up for the persistence worker.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct MutationSignal {
    dirty: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl MutationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that state changed and wake the worker.
    ///
    /// A wake-up sent while no worker is waiting is kept until the next wait.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Configuration for the persistence worker.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// How long to wait after the first mutation before writing
    pub coalesce: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            coalesce: DEFAULT_COALESCE,
        }
    }
}

impl FlushConfig {
    pub fn new(coalesce: Duration) -> Self {
        Self { coalesce }
    }
}

/// Error returned by [`FlushHandle`] operations.
#[derive(Debug)]
pub enum FlushError {
    /// The worker task is no longer running
    WorkerStopped,
    /// The worker task panicked
    WorkerPanicked,
    /// The save itself failed
    Persistence(PersistenceError),
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushError::WorkerStopped => write!(f, "persistence worker is not running"),
            FlushError::WorkerPanicked => write!(f, "persistence worker panicked"),
            FlushError::Persistence(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlushError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceError> for FlushError {
    fn from(e: PersistenceError) -> Self {
        FlushError::Persistence(e)
    }
}

enum Command {
    FlushNow(oneshot::Sender<Result<usize, PersistenceError>>),
    Shutdown(oneshot::Sender<Result<usize, PersistenceError>>),
}

/// Snapshot the tracker and save it synchronously.
///
/// Used on paths where the runtime may be gone, such as a panic hook.
/// Returns the number of entries written.
pub fn persist_snapshot<S>(
    tracker: &CooldownTracker<S>,
    store: &dyn CooldownStore,
) -> Result<usize, PersistenceError>
where
    S: Storage<CooldownKey, CooldownState> + Clone,
{
    let entries = tracker.snapshot();
    store.save(&entries)?;
    Ok(entries.len())
}

/// Background task writing cooldown snapshots.
pub struct PersistenceWorker<S>
where
    S: Storage<CooldownKey, CooldownState> + Clone,
{
    tracker: Arc<CooldownTracker<S>>,
    store: Arc<dyn CooldownStore>,
    config: FlushConfig,
}

impl<S> PersistenceWorker<S>
where
    S: Storage<CooldownKey, CooldownState> + Clone + 'static,
{
    /// Spawn the worker on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn spawn(
        tracker: Arc<CooldownTracker<S>>,
        store: Arc<dyn CooldownStore>,
        config: FlushConfig,
    ) -> FlushHandle {
        let (commands, receiver) = mpsc::channel(8);
        let worker = Self {
            tracker,
            store,
            config,
        };
        let task = tokio::spawn(worker.run(receiver));
        FlushHandle { commands, task }
    }

    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        let signal = self.tracker.signal().clone();
        // Set while a coalesced write is pending
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::FlushNow(reply)) => {
                        deadline = None;
                        signal.take_dirty();
                        let _ = reply.send(self.save().await);
                    }
                    Some(Command::Shutdown(reply)) => {
                        signal.take_dirty();
                        let _ = reply.send(self.save().await);
                        return;
                    }
                    None => {
                        // Handle dropped without shutdown: write once more and stop
                        if let Err(e) = self.save().await {
                            warn!(error = %e, "final cooldown save failed");
                        }
                        return;
                    }
                },
                _ = signal.notified(), if deadline.is_none() => {
                    deadline = Some(Instant::now() + self.config.coalesce);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    deadline = None;
                    if signal.take_dirty() {
                        if let Err(e) = self.save().await {
                            warn!(error = %e, "cooldown save failed; in-memory state kept");
                        }
                    }
                }
            }
        }
    }

    async fn save(&self) -> Result<usize, PersistenceError> {
        let entries = self.tracker.snapshot();
        let store = Arc::clone(&self.store);
        let count = entries.len();
        tokio::task::spawn_blocking(move || store.save(&entries))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))??;
        debug!(entries = count, "cooldown state saved");
        Ok(count)
    }
}

/// Handle to a running [`PersistenceWorker`].
#[derive(Debug)]
pub struct FlushHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Write the current snapshot now, bypassing the coalescing delay.
    pub async fn flush_now(&self) -> Result<usize, FlushError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::FlushNow(reply))
            .await
            .map_err(|_| FlushError::WorkerStopped)?;
        Ok(response.await.map_err(|_| FlushError::WorkerStopped)??)
    }

    /// Stop the worker after a final save, and wait for it to exit.
    pub async fn shutdown(self) -> Result<usize, FlushError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply)).await.is_err() {
            return match self.task.await {
                Err(e) if e.is_panic() => Err(FlushError::WorkerPanicked),
                _ => Err(FlushError::WorkerStopped),
            };
        }

        let saved = response.await.map_err(|_| FlushError::WorkerStopped);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                return Err(FlushError::WorkerPanicked);
            }
        }
        Ok(saved??)
    }

    /// True once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
