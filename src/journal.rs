use crate::error::WatchError;
use log::{debug, warn};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Compute the xxh64 hash of raw line bytes (without the line terminator).
pub fn line_hash(line: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(line, 0)
}

/// Session ordering key parsed from a journal file name.
///
/// Accepts `Journal.2024-03-05T201501.01.log` and the legacy
/// `Journal.240305201501.01.log`; both normalize to the same comparable
/// form, so files of either layout sort together.
///
/// ```
/// use journalfold::JournalKey;
///
/// let legacy = JournalKey::from_file_name("Journal.240305201501.01.log").unwrap();
/// let modern = JournalKey::from_file_name("Journal.2024-03-05T201501.02.log").unwrap();
/// assert!(legacy < modern);
/// assert_eq!(legacy.stamp(), "2024-03-05T201501");
/// assert!(JournalKey::from_file_name("Status.json").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JournalKey {
    stamp: String,
    part: u32,
}

impl JournalKey {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let middle = name.strip_prefix("Journal.")?.strip_suffix(".log")?;
        let (stamp, part) = middle.rsplit_once('.')?;
        let part = part.parse().ok()?;

        let stamp = if stamp.len() == 12 && stamp.bytes().all(|b| b.is_ascii_digit()) {
            format!(
                "20{}-{}-{}T{}",
                &stamp[0..2],
                &stamp[2..4],
                &stamp[4..6],
                &stamp[6..12]
            )
        } else if stamp.len() == 17
            && stamp
                .bytes()
                .all(|b| b.is_ascii_digit() || b == b'-' || b == b'T')
        {
            stamp.to_string()
        } else {
            return None;
        };

        Some(JournalKey { stamp, part })
    }

    /// Normalized session timestamp, `YYYY-MM-DDTHHMMSS`.
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn part(&self) -> u32 {
        self.part
    }
}

impl Ord for JournalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stamp
            .cmp(&other.stamp)
            .then(self.part.cmp(&other.part))
    }
}

impl PartialOrd for JournalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One append-only journal on disk and how far it has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFile {
    path: PathBuf,
    key: JournalKey,
    /// Bytes consumed: always the end of the last complete line read.
    offset: u64,
    live: bool,
}

impl JournalFile {
    /// Describe `path` as a journal, or `None` if its name is not a
    /// journal name.
    pub fn new(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let key = JournalKey::from_file_name(path.file_name()?.to_str()?)?;
        Some(JournalFile {
            path,
            key,
            offset: 0,
            live: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, used as the line origin.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn key(&self) -> &JournalKey {
        &self.key
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Start consuming at `offset` instead of the beginning.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Current on-disk length, or 0 if the file cannot be read right now.
    pub fn len_on_disk(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Enumerate the journals in `dir`, oldest session first.
///
/// Non-journal files are ignored and an empty directory yields an empty
/// list.
///
/// # Errors
///
/// Returns [`WatchError::Discovery`] if the directory is missing or cannot
/// be listed.
pub fn discover(dir: &Path) -> Result<Vec<JournalFile>, WatchError> {
    let entries = fs::read_dir(dir).map_err(|source| WatchError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<JournalFile> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| JournalFile::new(entry.path()))
        .collect();
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

/// Journals in `files` that belong to a later session than `current`.
pub fn newer_than<'a>(current: &JournalKey, files: &'a [JournalFile]) -> &'a [JournalFile] {
    let start = files.partition_point(|f| f.key() <= current);
    &files[start..]
}

/// Where a journal line came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineOrigin {
    /// File name of the source.
    pub file: Arc<str>,
    /// Byte offset of the first byte of the line.
    pub offset: u64,
    /// [`line_hash`] of the line bytes.
    pub hash: u64,
}

/// One complete line read from a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalLine {
    pub origin: LineOrigin,
    /// Byte offset just past the line terminator.
    pub end: u64,
    pub text: String,
}

/// Incremental reader over one [`JournalFile`].
///
/// Owns the open file handle for as long as it is attached; dropping the
/// reader (on rotation, stop, or an error path) releases it. Only complete,
/// newline-terminated lines are returned. An unterminated tail is buffered
/// and returned once its terminator arrives.
pub struct JournalReader {
    journal: JournalFile,
    name: Arc<str>,
    file: Option<File>,
    pending: Vec<u8>,
    truncated: bool,
}

impl JournalReader {
    /// Attach to `journal`, starting at its current offset.
    ///
    /// Opening is lazy: a file that is momentarily missing or locked is
    /// retried on every [`read_new_lines`](Self::read_new_lines).
    pub fn attach(mut journal: JournalFile) -> Self {
        journal.live = true;
        let name: Arc<str> = Arc::from(journal.name());
        JournalReader {
            journal,
            name,
            file: None,
            pending: Vec::new(),
            truncated: false,
        }
    }

    pub fn journal(&self) -> &JournalFile {
        &self.journal
    }

    /// Bytes of an unterminated line waiting for its terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the file shrank and was read again from the start since the
    /// previous call. Clears the flag.
    pub fn take_truncated(&mut self) -> bool {
        std::mem::take(&mut self.truncated)
    }

    /// Whether the OS file handle is currently held.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Read every complete line appended since the previous call.
    ///
    /// Transient conditions (missing, locked, unreadable) yield an empty
    /// batch and drop the handle so the next call reopens it.
    pub fn read_new_lines(&mut self) -> Vec<JournalLine> {
        match self.fill() {
            Ok(0) => Vec::new(),
            Ok(_) => self.split_lines(),
            Err(e) => {
                debug!(
                    "journalfold: {} not readable this poll: {e}",
                    self.journal.path.display()
                );
                self.file = None;
                Vec::new()
            }
        }
    }

    /// Release the handle and hand back the journal position.
    ///
    /// The offset still points past the last complete line, so attaching
    /// the returned journal again resumes without loss.
    pub fn detach(mut self) -> JournalFile {
        self.file = None;
        self.journal.live = false;
        self.journal
    }

    /// Release a journal that will not grow any more.
    ///
    /// An unterminated tail still pending at this point can never complete
    /// and is discarded with a warning.
    pub fn close(self) -> JournalFile {
        if !self.pending.is_empty() {
            warn!(
                "journalfold: discarding {} bytes of unterminated line at the end of {}",
                self.pending.len(),
                self.journal.path.display()
            );
        }
        self.detach()
    }

    fn fill(&mut self) -> io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.journal.path)?);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        let len = file.metadata()?.len();
        let read_pos = self.journal.offset + self.pending.len() as u64;

        if len < read_pos {
            warn!(
                "journalfold: {} shrank from {read_pos} to {len} bytes, rereading from the start",
                self.journal.path.display()
            );
            self.journal.offset = 0;
            self.pending.clear();
            self.truncated = true;
        } else if len == read_pos {
            return Ok(0);
        }

        let read_pos = self.journal.offset + self.pending.len() as u64;
        file.seek(SeekFrom::Start(read_pos))?;
        let before = self.pending.len();
        file.take(len - read_pos).read_to_end(&mut self.pending)?;
        Ok(self.pending.len() - before)
    }

    fn split_lines(&mut self) -> Vec<JournalLine> {
        let mut lines = Vec::new();
        let mut start = 0usize;

        while let Some(nl) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + nl;
            let mut content = &self.pending[start..end];
            if let Some(stripped) = content.strip_suffix(b"\r") {
                content = stripped;
            }

            if !content.iter().all(u8::is_ascii_whitespace) {
                lines.push(JournalLine {
                    origin: LineOrigin {
                        file: Arc::clone(&self.name),
                        offset: self.journal.offset + start as u64,
                        hash: line_hash(content),
                    },
                    end: self.journal.offset + end as u64 + 1,
                    text: String::from_utf8_lossy(content).into_owned(),
                });
            }
            start = end + 1;
        }

        self.pending.drain(..start);
        self.journal.offset += start as u64;
        lines
    }
}

impl std::fmt::Debug for JournalReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("journal", &self.journal)
            .field("open", &self.file.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Hash of the complete line ending just before `offset`.
///
/// `offset` should point at the byte after a line terminator. Returns
/// `None` if `offset` is 0 or beyond the end of the file.
pub fn read_line_hash_before(path: &Path, offset: u64) -> io::Result<Option<u64>> {
    if offset == 0 {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if offset > file_len {
        return Ok(None);
    }

    // offset - 1 is the '\n' ending the previous line
    let newline_pos = offset - 1;
    let mut start = 0u64;

    if newline_pos > 0 {
        let scan_start = newline_pos.saturating_sub(64 * 1024);
        file.seek(SeekFrom::Start(scan_start))?;
        let mut buf = vec![0u8; (newline_pos - scan_start) as usize];
        file.read_exact(&mut buf)?;

        start = match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => scan_start + pos as u64 + 1,
            None => scan_start,
        };
    }

    file.seek(SeekFrom::Start(start))?;
    let mut line = vec![0u8; (newline_pos - start) as usize];
    file.read_exact(&mut line)?;
    if let Some(stripped) = line.strip_suffix(b"\r") {
        return Ok(Some(line_hash(stripped)));
    }
    Ok(Some(line_hash(&line)))
}

/// Offset just past the last complete line of `path`.
///
/// Used to skip a journal's backlog without landing inside a line that is
/// still being written.
pub fn last_line_end(path: &Path) -> io::Result<u64> {
    const CHUNK: u64 = 64 * 1024;

    let mut file = File::open(path)?;
    let mut end = file.metadata()?.len();
    let mut buf = Vec::new();

    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        buf.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// A state log the producer rewrites in place, such as `Status.json` or
/// `Cargo.json`.
///
/// Each file holds a single record. [`poll`](Self::poll) yields it again
/// only after the file's length or modification time changed, and skips
/// content caught mid-rewrite until it parses.
///
/// The origin offset of a yielded line counts rewrites rather than bytes.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    name: Arc<str>,
    seen: Option<(u64, SystemTime)>,
    generation: u64,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name: Arc<str> = Arc::from(
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default(),
        );
        StateFile {
            path,
            name,
            seen: None,
            generation: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forget what was read so the next poll yields the record again.
    pub fn rewind(&mut self) {
        self.seen = None;
    }

    pub fn poll(&mut self) -> Option<JournalLine> {
        let metadata = fs::metadata(&self.path).ok()?;
        let stamp = (
            metadata.len(),
            metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        );
        if self.seen == Some(stamp) {
            return None;
        }

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                debug!("journalfold: {} not readable this poll: {e}", self.path.display());
                return None;
            }
        };
        let text = text.trim();
        if text.is_empty() || serde_json::from_str::<serde::de::IgnoredAny>(text).is_err() {
            debug!("journalfold: {} is mid-rewrite, retrying", self.path.display());
            return None;
        }

        self.seen = Some(stamp);
        self.generation += 1;
        Some(JournalLine {
            origin: LineOrigin {
                file: Arc::clone(&self.name),
                offset: self.generation,
                hash: line_hash(text.as_bytes()),
            },
            end: text.len() as u64,
            text: text.to_string(),
        })
    }
}
