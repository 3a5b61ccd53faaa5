//! Debounced recursive directory watcher (hot-reload).
//!
//! Every file under the root is compiled once when the watcher starts. After
//! that, filesystem events schedule a per-path reload that fires once the
//! path has been quiet for the debounce window, so an editor writing a file
//! several times in a row triggers a single recompile.

mod debounce;

pub use debounce::Debouncer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use stencil_core::config::WatchConfig;

use crate::error::{Result, TemplateError};

/// Watcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Quiet period a path needs before it is reloaded.
    pub debounce: Duration,
    /// Also watch files and directories whose name starts with `.`.
    pub include_hidden: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for WatcherConfig {
    fn from(config: &WatchConfig) -> Self {
        Self {
            debounce: config.debounce(),
            include_hidden: config.include_hidden,
        }
    }
}

/// Outcome of the initial scan performed by [`DirectoryWatcher::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub compiled: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum Message {
    Fs(notify::Result<Event>),
    Stop,
}

struct Running {
    control: Sender<Message>,
    worker: JoinHandle<()>,
    _watcher: RecommendedWatcher,
}

enum RunState {
    Idle,
    Running(Running),
    Stopped,
}

/// Watches a directory tree and recompiles files as they change.
///
/// A watcher runs at most once: after [`stop`](Self::stop) it cannot be
/// started again. Dropping a running watcher stops it.
pub struct DirectoryWatcher {
    root: PathBuf,
    config: WatcherConfig,
    state: Mutex<RunState>,
}

impl DirectoryWatcher {
    /// Create a watcher for `root`, which must be an existing directory.
    ///
    /// The root is canonicalized; reported paths live under the canonical root.
    pub fn new(root: impl AsRef<Path>, config: WatcherConfig) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(TemplateError::InvalidOptions(format!(
                "watch root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.canonicalize()?,
            config,
            state: Mutex::new(RunState::Idle),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> WatcherConfig {
        self.config
    }

    /// Subscribe to changes, compile every existing file, then hand reloads
    /// to a background thread.
    ///
    /// `compile` turns a file into a handle and `on_each_compiled` receives
    /// every handle produced, both during the initial scan and on later
    /// reloads. Compile failures are logged and never stop the watcher.
    /// The initial scan runs on the calling thread, so when `start` returns
    /// every file that existed has been offered to `compile`.
    pub fn start<H, C, S>(&self, mut compile: C, mut on_each_compiled: S) -> Result<ScanSummary>
    where
        C: FnMut(&Path) -> Result<H> + Send + 'static,
        S: FnMut(H) + Send + 'static,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            RunState::Idle => {}
            RunState::Running(_) => return Err(TemplateError::AlreadyRunning),
            RunState::Stopped => return Err(TemplateError::Stopped),
        }

        let (tx, rx) = mpsc::channel();
        let events = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The loop has exited once the receiver is gone.
            let _ = events.send(Message::Fs(res));
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        info!(path = %self.root.display(), "watching template directory for changes (recursive)");

        let summary = self.initial_scan(&mut compile, &mut on_each_compiled);
        info!(
            compiled = summary.compiled,
            failed = summary.failed,
            skipped = summary.skipped,
            "initial template scan complete"
        );

        let root = self.root.clone();
        let config = self.config;
        let worker = thread::Builder::new()
            .name("stencil-watcher".to_string())
            .spawn(move || {
                let mut reloader = Reloader {
                    root,
                    include_hidden: config.include_hidden,
                    compile,
                    on_each_compiled,
                };
                reloader.run(rx, Debouncer::new(config.debounce));
            })?;

        *state = RunState::Running(Running {
            control: tx,
            worker,
            _watcher: watcher,
        });
        Ok(summary)
    }

    fn initial_scan<H, C, S>(&self, compile: &mut C, on_each_compiled: &mut S) -> ScanSummary
    where
        C: FnMut(&Path) -> Result<H>,
        S: FnMut(H),
    {
        let mut summary = ScanSummary::default();
        let include_hidden = self.config.include_hidden;
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || include_hidden || !is_dot_name(entry.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to read entry during template scan");
                    summary.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match compile(path) {
                Ok(handle) => {
                    debug!(path = %path.display(), "compiled template");
                    on_each_compiled(handle);
                    summary.compiled += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to compile template during scan");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Stop watching and discard pending reloads. Waits for a reload that
    /// is already compiling to finish.
    ///
    /// Must not be called from inside the `compile` or `on_each_compiled`
    /// callbacks.
    pub fn stop(&self) -> Result<()> {
        let running = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, RunState::Stopped) {
                RunState::Running(running) => running,
                previous => {
                    *state = previous;
                    return Err(TemplateError::NotRunning);
                }
            }
        };

        let Running {
            control,
            worker,
            _watcher: watcher,
        } = running;
        drop(watcher);
        let _ = control.send(Message::Stop);
        if worker.join().is_err() {
            warn!(path = %self.root.display(), "watcher thread panicked");
        }
        info!(path = %self.root.display(), "stopped watching template directory");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            RunState::Running(_)
        )
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

/// State owned by the background thread.
struct Reloader<C, S> {
    root: PathBuf,
    include_hidden: bool,
    compile: C,
    on_each_compiled: S,
}

impl<H, C, S> Reloader<C, S>
where
    C: FnMut(&Path) -> Result<H>,
    S: FnMut(H),
{
    fn run(&mut self, rx: Receiver<Message>, mut debouncer: Debouncer) {
        loop {
            let message = match debouncer.next_deadline() {
                None => match rx.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            };

            match message {
                Some(Message::Stop) => break,
                Some(Message::Fs(Ok(event))) => {
                    if is_change(&event.kind) {
                        let now = Instant::now();
                        for path in event.paths.iter().filter(|p| self.is_watched(p)) {
                            debouncer.schedule(path, now);
                        }
                    }
                }
                Some(Message::Fs(Err(e))) => warn!(error = %e, "filesystem watcher error"),
                None => {}
            }

            for path in debouncer.drain_expired(Instant::now()) {
                self.reload(&path);
            }
        }
        debug!(pending = debouncer.pending(), "watcher loop exited");
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.include_hidden || !is_hidden(&self.root, path)
    }

    fn reload(&mut self, path: &Path) {
        if !path.is_file() {
            debug!(path = %path.display(), "skipping reload, not a file");
            return;
        }
        match (self.compile)(path) {
            Ok(handle) => {
                info!(path = %path.display(), "hot-reloaded template");
                (self.on_each_compiled)(handle);
            }
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "failed to compile template during hot-reload, keeping previous version"
            ),
        }
    }
}

/// Writes, creations, removals and renames. Reads and metadata-only changes
/// are ignored, otherwise compiling a file would schedule its own reload.
fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

fn is_dot_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

/// Whether any component of `path` below `root` starts with a dot.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| is_dot_name(c.as_os_str()))
}
