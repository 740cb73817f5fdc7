//! Control surface: a [`Watcher`] on its own thread, woken by file-system
//! events and a fallback timer.

use crate::error::WatchError;
use crate::fold::FoldEngine;
use crate::journal;
use crate::notification::{Bus, Notification, NotificationKind};
use crate::state::StarSystem;
use crate::watcher::{WatchConfig, Watcher};
use log::{debug, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the owner thread polls when no file-system event arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Builder for a [`Monitor`].
///
/// # Examples
///
/// ```no_run
/// use journalfold::Monitor;
/// use std::time::Duration;
///
/// let mut monitor = Monitor::builder("/path/to/journals")
///     .fast_start(true)
///     .poll_interval(Duration::from_millis(500))
///     .checkpoint("/var/lib/journalfold/checkpoint.json")
///     .build()?;
/// monitor.start_monitoring()?;
/// # Ok::<(), journalfold::WatchError>(())
/// ```
#[derive(Debug)]
pub struct MonitorBuilder {
    config: WatchConfig,
    poll_interval: Duration,
    visited: Vec<u64>,
    bus: Option<Bus>,
}

impl MonitorBuilder {
    fn new(journal_dir: PathBuf) -> Self {
        MonitorBuilder {
            config: WatchConfig::new(journal_dir),
            poll_interval: DEFAULT_POLL_INTERVAL,
            visited: Vec::new(),
            bus: None,
        }
    }

    /// Skip the backlog and attach at the end of the newest journal.
    pub fn fast_start(mut self, fast_start: bool) -> Self {
        self.config.fast_start = fast_start;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Persist and resume the tailing position at `path`.
    pub fn checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.checkpoint = Some(path.into());
        self
    }

    /// Seed the visited-systems set with [`StarSystem::visit_key`] values.
    pub fn visited_systems(mut self, visited: impl IntoIterator<Item = u64>) -> Self {
        self.visited.extend(visited);
        self
    }

    /// Follow `Status.json` and `Cargo.json` as well (on by default).
    pub fn state_files(mut self, enabled: bool) -> Self {
        self.config.state_files = enabled;
        self
    }

    /// Publish to an existing bus instead of a fresh one.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// # Errors
    ///
    /// [`WatchError::CheckpointLocked`] if another monitor owns the
    /// configured checkpoint.
    pub fn build(self) -> Result<Monitor, WatchError> {
        let bus = self.bus.unwrap_or_default();
        let engine = FoldEngine::with_visited(self.visited);
        let watcher = Watcher::with_engine(self.config, bus.clone(), engine)?;
        Ok(Monitor {
            bus,
            poll_interval: self.poll_interval,
            shared: Arc::new(Shared::default()),
            watcher: Some(watcher),
            worker: None,
        })
    }
}

enum Control {
    Wake,
    Reset,
    Stop,
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    location: RwLock<Option<StarSystem>>,
    last_error: Mutex<Option<Arc<WatchError>>>,
}

impl Shared {
    fn set_location(&self, location: Option<StarSystem>) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = location;
    }

    fn set_error(&self, error: WatchError) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(error));
    }
}

struct Worker {
    control: Sender<Control>,
    handle: JoinHandle<Watcher>,
    // Dropping it stops the file-system callbacks.
    fs_watcher: Option<RecommendedWatcher>,
}

/// Journal monitor with start/stop/reset controls.
///
/// While monitoring, one owner thread runs the [`Watcher`]; control calls
/// only send it messages. The folded state survives
/// [`stop_monitoring`](Self::stop_monitoring), so a later start continues
/// where the previous one left off.
pub struct Monitor {
    bus: Bus,
    poll_interval: Duration,
    shared: Arc<Shared>,
    /// Present while stopped.
    watcher: Option<Watcher>,
    /// Present while a thread has been started and not yet joined.
    worker: Option<Worker>,
}

impl Monitor {
    pub fn builder(journal_dir: impl Into<PathBuf>) -> MonitorBuilder {
        MonitorBuilder::new(journal_dir.into())
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn subscribe(&self, kind: NotificationKind) -> Receiver<Notification> {
        self.bus.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> Receiver<Notification> {
        self.bus.subscribe_all()
    }

    /// Whether the owner thread is tailing. Turns false on its own if
    /// discovery fails; see [`last_error`](Self::last_error).
    pub fn is_monitoring(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Location as of the most recent poll.
    pub fn last_known_location(&self) -> Option<StarSystem> {
        self.shared
            .location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The error that last ended monitoring, if any.
    pub fn last_error(&self) -> Option<Arc<WatchError>> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Visit keys of every system seen so far, for persisting. Only
    /// available while stopped.
    pub fn visited_systems(&self) -> Option<Vec<u64>> {
        let watcher = self.watcher.as_ref()?;
        Some(watcher.engine().visited().collect())
    }

    /// Spawn the owner thread. No-op while already monitoring.
    ///
    /// # Errors
    ///
    /// [`WatchError::Discovery`] if the journal directory cannot be listed,
    /// [`WatchError::Notify`] if no file-system watcher can be created.
    pub fn start_monitoring(&mut self) -> Result<(), WatchError> {
        if self.is_monitoring() {
            return Ok(());
        }
        self.reclaim()?;
        let Some(mut watcher) = self.watcher.take() else {
            return Err(WatchError::ThreadPanicked);
        };

        let dir = watcher.config().journal_dir.clone();
        if let Err(e) = journal::discover(&dir) {
            self.watcher = Some(watcher);
            return Err(e);
        }

        let (control, rx) = mpsc::channel();
        let wake = control.clone();
        let on_event = move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = wake.send(Control::Wake);
            }
        };
        let mut fs_watcher = match notify::recommended_watcher(on_event) {
            Ok(fs_watcher) => fs_watcher,
            Err(e) => {
                self.watcher = Some(watcher);
                return Err(e.into());
            }
        };
        let fs_watcher = match fs_watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => Some(fs_watcher),
            Err(e) => {
                warn!(
                    "journalfold: cannot watch {}, polling every {:?}: {e}",
                    dir.display(),
                    self.poll_interval
                );
                None
            }
        };

        watcher.start();
        *self
            .shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        let handle = thread::spawn(move || run(watcher, rx, &shared, interval));

        info!("journalfold: monitoring {}", dir.display());
        self.worker = Some(Worker {
            control,
            handle,
            fs_watcher,
        });
        Ok(())
    }

    /// Stop the owner thread and wait for it. Folded state is kept.
    ///
    /// # Errors
    ///
    /// [`WatchError::ThreadPanicked`] if the owner thread panicked; the
    /// folded state is lost in that case.
    pub fn stop_monitoring(&mut self) -> Result<(), WatchError> {
        if let Some(worker) = &self.worker {
            let _ = worker.control.send(Control::Stop);
        }
        self.reclaim()?;
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.stop();
        }
        Ok(())
    }

    /// Clear the folded session and rediscover the journals, as a fresh
    /// start would. The visited set is kept.
    ///
    /// While monitoring, the owner thread applies the reset between polls
    /// and clears the last known location itself.
    pub fn reset(&mut self) {
        if self.is_monitoring() {
            if let Some(worker) = &self.worker {
                let _ = worker.control.send(Control::Reset);
                return;
            }
        }
        // thread exited on its own, or never started
        if let Err(e) = self.reclaim() {
            warn!("journalfold: {e}");
        }
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.reset();
        }
        self.shared.set_location(None);
    }

    /// Join a finished (or stopping) owner thread and take the watcher back.
    fn reclaim(&mut self) -> Result<(), WatchError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.fs_watcher);
        let result = worker.handle.join();
        self.shared.running.store(false, Ordering::Release);
        match result {
            Ok(watcher) => {
                self.shared.set_location(watcher.last_known_location());
                self.watcher = Some(watcher);
                Ok(())
            }
            Err(_) => Err(WatchError::ThreadPanicked),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop_monitoring() {
            warn!("journalfold: {e}");
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("monitoring", &self.is_monitoring())
            .field("poll_interval", &self.poll_interval)
            .field("bus", &self.bus)
            .finish()
    }
}

/// Owner-thread loop. Returns the watcher so its state outlives the thread.
fn run(
    mut watcher: Watcher,
    control: Receiver<Control>,
    shared: &Shared,
    interval: Duration,
) -> Watcher {
    'poll: loop {
        match watcher.poll() {
            Ok(summary) if summary.lines > 0 => debug!("journalfold: {summary:?}"),
            Ok(_) => {}
            Err(e) => {
                warn!("journalfold: monitoring stopped: {e}");
                shared.set_error(e);
            }
        }
        shared.set_location(watcher.last_known_location());
        if !watcher.is_running() {
            break;
        }

        let first = match control.recv_timeout(interval) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => Control::Wake,
            Err(RecvTimeoutError::Disconnected) => Control::Stop,
        };
        // Coalesce a burst of wake-ups into one poll.
        for message in std::iter::once(first).chain(control.try_iter()) {
            match message {
                Control::Wake => {}
                Control::Reset => {
                    watcher.reset();
                    shared.set_location(None);
                }
                Control::Stop => {
                    watcher.stop();
                    break 'poll;
                }
            }
        }
    }

    shared.running.store(false, Ordering::Release);
    watcher
}
