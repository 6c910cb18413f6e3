//! Debounced batch file watcher.
//!
//! Explicit state machine: `idle → detecting → debouncing → (rebuilding →
//! debouncing | idle)`. The debounce core is pure (drive it with events
//! and ticks in tests); the wiring thread feeds it from a `notify`
//! recursive watcher through a crossbeam channel.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Directories the watcher never reacts to.
pub const WATCH_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    "coverage",
    "__pycache__",
    ".lattice",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Idle,
    Detecting,
    Debouncing,
    Rebuilding,
}

/// Pure debounce state machine. Queue has set semantics; events during a
/// rebuild accumulate for the next flush.
#[derive(Debug)]
pub struct DebounceCore {
    state: WatcherState,
    queue: BTreeSet<PathBuf>,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl DebounceCore {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: WatcherState::Idle,
            queue: BTreeSet::new(),
            debounce,
            deadline: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// A filesystem event: queue the path and (re)arm the timer unless a
    /// rebuild is in flight, in which case the path just accumulates.
    pub fn note_event(&mut self, path: PathBuf, now: Instant) {
        if is_ignored(&path) {
            return;
        }
        self.queue.insert(path);
        match self.state {
            WatcherState::Rebuilding => {}
            WatcherState::Idle | WatcherState::Detecting | WatcherState::Debouncing => {
                self.state = WatcherState::Debouncing;
                self.deadline = Some(now + self.debounce);
            }
        }
    }

    /// Timer check. Returns the drained batch when the debounce window
    /// elapsed with work queued and no rebuild already running.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        if self.state != WatcherState::Debouncing {
            return None;
        }
        if self.deadline.is_some_and(|d| now < d) {
            return None;
        }
        if self.queue.is_empty() {
            self.state = WatcherState::Idle;
            self.deadline = None;
            return None;
        }
        let batch: Vec<PathBuf> = std::mem::take(&mut self.queue).into_iter().collect();
        self.state = WatcherState::Rebuilding;
        self.deadline = None;
        Some(batch)
    }

    /// The batch handler resolved. Back to debouncing when more events
    /// arrived in the meantime, idle otherwise.
    pub fn batch_done(&mut self, now: Instant) {
        if self.queue.is_empty() {
            self.state = WatcherState::Idle;
            self.deadline = None;
        } else {
            self.state = WatcherState::Debouncing;
            self.deadline = Some(now + self.debounce);
        }
    }

    /// `stop()`: cancel the timer, clear the queue, return to idle.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.deadline = None;
        self.state = WatcherState::Idle;
    }

    /// Next wakeup the wiring loop should use.
    fn next_timeout(&self) -> Duration {
        match (self.state, self.deadline) {
            (WatcherState::Debouncing, Some(deadline)) => {
                deadline.saturating_duration_since(Instant::now())
            }
            _ => self.debounce,
        }
    }
}

fn is_ignored(path: &PathBuf) -> bool {
    let text = path.to_string_lossy();
    WATCH_IGNORES
        .iter()
        .any(|needle| text.contains(&format!("/{needle}/")) || text.ends_with(&format!("/{needle}")))
}

enum WireMessage {
    Fs(PathBuf),
    Stop,
}

/// Batch handler invoked with each drained batch (typically an
/// incremental build).
pub type BatchHandler = Arc<dyn Fn(Vec<PathBuf>) + Send + Sync>;

/// Single-directory recursive watcher driving `DebounceCore` on its own
/// thread.
pub struct FileWatcher {
    tx: Sender<WireMessage>,
    thread: Option<std::thread::JoinHandle<()>>,
    state: Arc<Mutex<WatcherState>>,
    watched_dir: PathBuf,
}

impl FileWatcher {
    pub fn start(
        dir: PathBuf,
        debounce: Duration,
        handler: BatchHandler,
    ) -> notify::Result<Self> {
        let (tx, rx) = bounded::<WireMessage>(4096);
        let state = Arc::new(Mutex::new(WatcherState::Detecting));

        let fs_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if let Ok(event) = event {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_)
                        | notify::EventKind::Modify(_)
                        | notify::EventKind::Remove(_)
                ) {
                    for path in event.paths {
                        let _ = fs_tx.try_send(WireMessage::Fs(path));
                    }
                }
            }
        })?;
        watcher.watch(&dir, RecursiveMode::Recursive)?;
        info!(dir = %dir.display(), "file watcher started");

        let loop_state = Arc::clone(&state);
        let thread = std::thread::Builder::new()
            .name("lattice-watcher".to_string())
            .spawn(move || {
                // Watcher moves into the thread so it lives as long as the loop.
                let _watcher = watcher;
                watch_loop(rx, debounce, handler, loop_state);
            })
            .expect("failed to spawn watcher thread");

        Ok(Self {
            tx,
            thread: Some(thread),
            state,
            watched_dir: dir,
        })
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn watched_dir(&self) -> &PathBuf {
        &self.watched_dir
    }

    /// Cancel the timer, close the watcher, clear the queue.
    pub fn stop(mut self) {
        let _ = self.tx.send(WireMessage::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!(dir = %self.watched_dir.display(), "file watcher stopped");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(WireMessage::Stop);
    }
}

fn watch_loop(
    rx: Receiver<WireMessage>,
    debounce: Duration,
    handler: BatchHandler,
    shared_state: Arc<Mutex<WatcherState>>,
) {
    let mut core = DebounceCore::new(debounce);
    let publish = |core: &DebounceCore, shared: &Arc<Mutex<WatcherState>>| {
        *shared.lock().unwrap_or_else(|e| e.into_inner()) = core.state();
    };
    publish(&core, &shared_state);

    loop {
        match rx.recv_timeout(core.next_timeout()) {
            Ok(WireMessage::Fs(path)) => {
                debug!(path = %path.display(), "fs event");
                core.note_event(path, Instant::now());
            }
            Ok(WireMessage::Stop) => {
                core.reset();
                publish(&core, &shared_state);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                core.reset();
                publish(&core, &shared_state);
                break;
            }
        }

        if let Some(batch) = core.poll(Instant::now()) {
            publish(&core, &shared_state);
            info!(files = batch.len(), "watcher batch flushed");
            handler(batch);
            core.batch_done(Instant::now());
        }
        publish(&core, &shared_state);

        // Drain anything that queued while the handler ran.
        while let Ok(message) = rx.try_recv() {
            match message {
                WireMessage::Fs(path) => core.note_event(path, Instant::now()),
                WireMessage::Stop => {
                    core.reset();
                    publish(&core, &shared_state);
                    return;
                }
            }
        }
    }
    warn!("watcher loop exited");
}
