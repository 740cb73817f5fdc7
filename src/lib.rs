mod checkpoint;
mod error;
mod event;
mod fold;
mod gate;
mod journal;
mod mining;
mod monitor;
mod notification;
mod state;
mod watcher;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{DecodeError, WatchError};
pub use event::{
    decode, normalize_name, EventBody, Ingredient, JournalEvent, MaterialChange, Transfer,
    TransferDirection,
};
pub use fold::{FoldEngine, LIMPETS};
pub use gate::{DedupGate, Fingerprint};
pub use journal::{
    discover, last_line_end, line_hash, newer_than, read_line_hash_before, JournalFile,
    JournalKey, JournalLine, JournalReader, LineOrigin, StateFile,
};
pub use mining::{MiningCompanion, Reminder, DEFAULT_RESTOCK_SERVICES, MINING_KINDS};
pub use monitor::{Monitor, MonitorBuilder, DEFAULT_POLL_INTERVAL};
pub use notification::{Bus, Notification, NotificationKind};
pub use state::{
    adjust, DisplayNames, Identity, Inventory, Loadout, MaterialCategory, Materials, Module,
    SessionState, StarSystem, StationContext, Status,
};
pub use watcher::{Phase, PollSummary, WatchConfig, Watcher, STATE_FILES};
