//! The tailing state machine.
//!
//! A [`Watcher`] owns every journal handle, the folded [`SessionState`], the
//! [`DedupGate`] and the optional [`CheckpointStore`]. It is driven by
//! [`Watcher::poll`], which advances through the phases synchronously; the
//! [`Monitor`](crate::Monitor) wraps it in an owner thread.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::WatchError;
use crate::event::decode;
use crate::fold::FoldEngine;
use crate::gate::DedupGate;
use crate::journal::{self, JournalFile, JournalLine, JournalReader, StateFile};
use crate::notification::{Bus, Notification};
use crate::state::{SessionState, StarSystem};
use log::{debug, info, trace, warn};
use std::collections::VecDeque;
use std::path::PathBuf;

/// State logs the producer rewrites in place next to the journals.
pub const STATE_FILES: &[&str] = &["Status.json", "Cargo.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Discovering,
    Backfilling,
    Live,
    Stopped,
}

/// Watcher settings. Plain fields; [`Monitor::builder`](crate::Monitor::builder)
/// fills them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub journal_dir: PathBuf,
    /// Skip the backlog: attach to the newest journal at its end.
    pub fast_start: bool,
    /// Log every folded event at `info` instead of `trace`.
    pub verbose: bool,
    /// Also follow [`STATE_FILES`].
    pub state_files: bool,
    /// Where to persist the resume position, if anywhere.
    pub checkpoint: Option<PathBuf>,
}

impl WatchConfig {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        WatchConfig {
            journal_dir: journal_dir.into(),
            fast_start: false,
            verbose: false,
            state_files: true,
            checkpoint: None,
        }
    }
}

/// What one [`Watcher::poll`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Complete lines consumed, journal and state files together.
    pub lines: usize,
    pub published: usize,
    /// Notifications held back by the dedup gate.
    pub suppressed: usize,
    pub decode_failures: usize,
    pub rotations: usize,
}

/// Single-owner journal tailer.
///
/// # Examples
///
/// ```no_run
/// use journalfold::{Bus, NotificationKind, WatchConfig, Watcher};
///
/// let bus = Bus::new();
/// let locations = bus.subscribe(NotificationKind::Location);
///
/// let mut watcher = Watcher::open(WatchConfig::new("/path/to/journals"), bus)?;
/// watcher.start();
/// watcher.poll()?;
///
/// for note in locations.try_iter() {
///     println!("{note:?}");
/// }
/// # Ok::<(), journalfold::WatchError>(())
/// ```
pub struct Watcher {
    config: WatchConfig,
    bus: Bus,
    engine: FoldEngine,
    gate: DedupGate,
    state: SessionState,
    phase: Phase,
    backlog: VecDeque<JournalFile>,
    live: Option<JournalReader>,
    /// Where reading stopped, kept across Stop so Start continues there.
    cursor: Option<JournalFile>,
    fast_start_pending: bool,
    state_files: Vec<StateFile>,
    checkpoint: Option<CheckpointStore>,
    decode_failures: u64,
}

impl Watcher {
    /// Create an idle watcher publishing to `bus`.
    ///
    /// # Errors
    ///
    /// Fails only if a checkpoint is configured and cannot be locked.
    pub fn open(config: WatchConfig, bus: Bus) -> Result<Self, WatchError> {
        Self::with_engine(config, bus, FoldEngine::new())
    }

    /// Like [`open`](Self::open), folding with `engine` (for example one
    /// seeded with previously visited systems).
    pub fn with_engine(
        config: WatchConfig,
        bus: Bus,
        engine: FoldEngine,
    ) -> Result<Self, WatchError> {
        let checkpoint = config
            .checkpoint
            .clone()
            .map(CheckpointStore::open)
            .transpose()?;
        let state_files = if config.state_files {
            STATE_FILES
                .iter()
                .map(|name| StateFile::new(config.journal_dir.join(name)))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Watcher {
            config,
            bus,
            engine,
            gate: DedupGate::new(),
            state: SessionState::default(),
            phase: Phase::Idle,
            backlog: VecDeque::new(),
            live: None,
            cursor: None,
            fast_start_pending: true,
            state_files,
            checkpoint,
            decode_failures: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Stopped)
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn engine(&self) -> &FoldEngine {
        &self.engine
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn last_known_location(&self) -> Option<StarSystem> {
        self.state.system.clone()
    }

    /// The journal currently tailed, once live.
    pub fn live_journal(&self) -> Option<&JournalFile> {
        self.live.as_ref().map(JournalReader::journal)
    }

    /// Lines skipped because they did not decode, since the watcher opened.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Begin (or resume) monitoring. No-op while already running.
    pub fn start(&mut self) {
        if !self.is_running() {
            self.set_phase(Phase::Discovering);
        }
    }

    /// Release every handle and stop. Folded state, the gate, the visited
    /// set and the read position are kept.
    ///
    /// The next [`start`](Self::start) continues after the last line read,
    /// so lines written while stopped are folded onto the kept state.
    pub fn stop(&mut self) {
        self.park();
        self.flush_checkpoint();
        self.set_phase(Phase::Stopped);
    }

    /// Forget the session: state, gate, read position and checkpoint are
    /// cleared, a [`Notification::SessionReset`] is published, and the
    /// journals are rediscovered on the next poll (fast start applies again
    /// if configured). The visited set is kept.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
        self.gate.reset();
        self.live = None;
        self.backlog.clear();
        self.cursor = None;
        self.fast_start_pending = true;
        for file in &mut self.state_files {
            file.rewind();
        }
        if let Some(store) = self.checkpoint.as_mut() {
            if let Err(e) = store.clear() {
                warn!("journalfold: cannot clear checkpoint {}: {e}", store.path().display());
            }
        }
        info!("journalfold: session state reset");
        self.bus.publish(Notification::SessionReset);
        if self.is_running() {
            self.set_phase(Phase::Discovering);
        }
    }

    /// Advance as far as the journals on disk allow.
    ///
    /// Runs discovery and backfill to completion when due, then reads
    /// whatever the live journal and state files gained since the last poll.
    ///
    /// # Errors
    ///
    /// A discovery failure returns the watcher to [`Phase::Idle`]; call
    /// [`start`](Self::start) to retry.
    pub fn poll(&mut self) -> Result<PollSummary, WatchError> {
        let mut summary = PollSummary::default();
        let result = self.step(&mut summary);
        self.flush_checkpoint();
        result.map(|()| summary)
    }

    fn step(&mut self, summary: &mut PollSummary) -> Result<(), WatchError> {
        loop {
            match self.phase {
                Phase::Idle | Phase::Stopped => return Ok(()),
                Phase::Discovering => {
                    if !self.discover()? {
                        return Ok(());
                    }
                }
                Phase::Backfilling => {
                    if !self.backfill(summary) {
                        return Ok(());
                    }
                }
                Phase::Live => {
                    if !self.tail(summary)? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Queue the journals to replay. `false` while there is nothing yet.
    fn discover(&mut self) -> Result<bool, WatchError> {
        let files = self.list_journals()?;
        let Some(newest) = files.last() else {
            debug!(
                "journalfold: no journals in {} yet",
                self.config.journal_dir.display()
            );
            return Ok(false);
        };

        let cursor = match self.cursor.take() {
            Some(cursor) if files.iter().any(|f| f.key() == cursor.key()) => Some(cursor),
            Some(cursor) => {
                warn!("journalfold: {} is gone, rediscovering", cursor.name());
                None
            }
            None => None,
        };

        if let Some(cursor) = cursor {
            info!(
                "journalfold: continuing {} at byte {}",
                cursor.name(),
                cursor.offset()
            );
            let newer = journal::newer_than(cursor.key(), &files).to_vec();
            self.backlog = std::iter::once(cursor).chain(newer).collect();
        } else if self.config.fast_start && self.fast_start_pending {
            let end = journal::last_line_end(newest.path())
                .unwrap_or_else(|_| newest.len_on_disk());
            info!("journalfold: fast start at the end of {}", newest.name());
            self.backlog = VecDeque::from([newest.clone().with_offset(end)]);
        } else if let Some(resume) = self.resume_point(&files) {
            info!(
                "journalfold: resuming {} at byte {}",
                resume.name(),
                resume.offset()
            );
            let newer = journal::newer_than(resume.key(), &files).to_vec();
            self.backlog = std::iter::once(resume).chain(newer).collect();
        } else {
            // A full replay rebuilds the session; the gate keeps it quiet.
            self.state = SessionState::default();
            for file in &mut self.state_files {
                file.rewind();
            }
            self.backlog = files.into();
        }

        self.fast_start_pending = false;
        self.set_phase(Phase::Backfilling);
        Ok(true)
    }

    fn resume_point(&self, files: &[JournalFile]) -> Option<JournalFile> {
        let store = self.checkpoint.as_ref()?;
        match store.load() {
            Ok(checkpoint) => checkpoint?.locate(files),
            Err(e) => {
                warn!(
                    "journalfold: cannot read checkpoint {}: {e}",
                    store.path().display()
                );
                None
            }
        }
    }

    /// Replay the backlog oldest-first; the last journal stays attached.
    /// `false` if a journal could not be read this poll.
    fn backfill(&mut self, summary: &mut PollSummary) -> bool {
        while let Some(next) = self.backlog.pop_front() {
            let mut reader = JournalReader::attach(next);
            let lines = read_lines(&mut self.gate, &mut reader);
            if !reader.is_open() {
                let journal = reader.detach();
                if journal.path().exists() {
                    self.backlog.push_front(journal);
                    return false;
                }
                warn!("journalfold: {} vanished before it was read", journal.name());
                continue;
            }
            self.process(&lines, true, summary);

            if self.backlog.is_empty() {
                info!("journalfold: live on {}", reader.journal().name());
                self.live = Some(reader);
            } else {
                reader.close();
            }
        }

        self.set_phase(if self.live.is_some() {
            Phase::Live
        } else {
            Phase::Discovering
        });
        true
    }

    /// Read the live journal and state files. `true` if a newer journal
    /// appeared and the backlog needs replaying.
    fn tail(&mut self, summary: &mut PollSummary) -> Result<bool, WatchError> {
        let Some(reader) = self.live.as_mut() else {
            self.set_phase(Phase::Discovering);
            return Ok(true);
        };
        let lines = read_lines(&mut self.gate, reader);
        let current = reader.journal().key().clone();
        self.process(&lines, true, summary);

        let files = self.list_journals()?;
        let newer = journal::newer_than(&current, &files);
        if let Some(next) = newer.first() {
            if let Some(mut old) = self.live.take() {
                let rest = read_lines(&mut self.gate, &mut old);
                self.process(&rest, true, summary);
                info!(
                    "journalfold: rotating from {} to {}",
                    old.journal().name(),
                    next.name()
                );
                old.close();
            }
            self.backlog.extend(newer.iter().cloned());
            summary.rotations += 1;
            self.set_phase(Phase::Backfilling);
            return Ok(true);
        }

        let mut records = Vec::new();
        for file in &mut self.state_files {
            records.extend(file.poll());
        }
        self.process(&records, false, summary);
        Ok(false)
    }

    fn list_journals(&mut self) -> Result<Vec<JournalFile>, WatchError> {
        match journal::discover(&self.config.journal_dir) {
            Ok(files) => Ok(files),
            Err(e) => {
                warn!("journalfold: {e}");
                self.park();
                self.set_phase(Phase::Idle);
                Err(e)
            }
        }
    }

    /// decode → fold → gate → publish, one line at a time.
    fn process(
        &mut self,
        lines: &[JournalLine],
        journal_lines: bool,
        summary: &mut PollSummary,
    ) {
        for line in lines {
            summary.lines += 1;
            // State-file records are never replays; only journals are marked.
            let replay = journal_lines && self.gate.is_replay(&line.origin);
            if journal_lines {
                self.gate.consume(&line.origin, line.end);
                if let Some(store) = self.checkpoint.as_mut() {
                    store.record(Checkpoint::new(
                        &*line.origin.file,
                        line.end,
                        line.origin.hash,
                    ));
                }
            }

            let event = match decode(&line.text) {
                Ok(event) => event,
                Err(e) => {
                    self.decode_failures += 1;
                    summary.decode_failures += 1;
                    warn!(
                        "journalfold: skipping {}@{}: {e}",
                        line.origin.file, line.origin.offset
                    );
                    continue;
                }
            };
            if self.config.verbose {
                info!("journalfold: {} {}", event.timestamp, event.kind());
            } else {
                trace!("journalfold: {} {}", event.timestamp, event.kind());
            }

            for note in self.engine.apply_mut(&mut self.state, &event) {
                if self.gate.admit(&note, replay) {
                    self.bus.publish(note);
                    summary.published += 1;
                } else {
                    summary.suppressed += 1;
                }
            }
        }
    }

    /// Release every handle, remembering where reading should continue.
    fn park(&mut self) {
        if let Some(reader) = self.live.take() {
            self.cursor = Some(reader.detach());
        } else if let Some(next) = self.backlog.pop_front() {
            self.cursor = Some(next);
        }
        self.backlog.clear();
    }

    fn flush_checkpoint(&mut self) {
        if let Some(store) = self.checkpoint.as_mut() {
            if let Err(e) = store.flush() {
                warn!("journalfold: cannot save checkpoint {}: {e}", store.path().display());
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("journalfold: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

fn read_lines(gate: &mut DedupGate, reader: &mut JournalReader) -> Vec<JournalLine> {
    let lines = reader.read_new_lines();
    if reader.take_truncated() {
        gate.forget(reader.journal().name());
    }
    lines
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("journal_dir", &self.config.journal_dir)
            .field("phase", &self.phase)
            .field("live", &self.live_journal().map(JournalFile::name))
            .field("backlog", &self.backlog.len())
            .field("decode_failures", &self.decode_failures)
            .finish()
    }
}
