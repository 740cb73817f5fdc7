#![allow(dead_code)]

use journalfold::{
    decode, Bus, FoldEngine, Notification, NotificationKind, SessionState, WatchConfig, Watcher,
};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;

pub const JOURNAL_A: &str = "Journal.2024-03-05T201501.01.log";
pub const JOURNAL_B: &str = "Journal.2024-03-06T090000.01.log";
pub const JOURNAL_LEGACY: &str = "Journal.240301120000.01.log";

/// One journal record as a JSON line, without the terminator.
pub fn record(event: &str, fields: Value) -> String {
    let mut record = json!({"timestamp": "3310-03-05T20:15:01Z", "event": event});
    if let (Some(map), Value::Object(extra)) = (record.as_object_mut(), fields) {
        map.extend(extra);
    }
    record.to_string()
}

pub fn location(name: &str, address: u64) -> String {
    record(
        "FSDJump",
        json!({"StarSystem": name, "SystemAddress": address, "StarPos": [0.0, 0.0, 0.0]}),
    )
}

pub fn transfer(commodity: &str, count: u32, direction: &str) -> String {
    record(
        "CargoTransfer",
        json!({"Transfers": [{"Type": commodity, "Count": count, "Direction": direction}]}),
    )
}

pub fn load_game(commander: &str, credits: i64) -> String {
    record(
        "LoadGame",
        json!({"Commander": commander, "FID": "F100", "Ship": "Python", "ShipID": 3, "Credits": credits}),
    )
}

pub fn header(part: u32) -> String {
    record("Fileheader", json!({"part": part, "gameversion": "4.0.0.1801"}))
}

pub fn voucher(amount: i64) -> String {
    record("RedeemVoucher", json!({"Amount": amount}))
}

/// Append complete lines to `path`, creating it if needed.
pub fn append_lines(path: &Path, lines: &[String]) {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    append_raw(path, &text);
}

/// Append raw text with no terminator added.
pub fn append_raw(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

/// Fold `lines` from empty state, ignoring lines that do not decode.
pub fn fold_lines(lines: &[String]) -> SessionState {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    for line in lines {
        if let Ok(event) = decode(line) {
            engine.apply_mut(&mut state, &event);
        }
    }
    state
}

/// A watcher on `dir` that ignores state files, plus a subscription to
/// everything it publishes.
pub fn open_watcher(dir: &Path) -> (Watcher, Receiver<Notification>) {
    let mut config = WatchConfig::new(dir);
    config.state_files = false;
    let bus = Bus::new();
    let rx = bus.subscribe_all();
    (Watcher::open(config, bus).unwrap(), rx)
}

pub fn drain(rx: &Receiver<Notification>) -> Vec<Notification> {
    rx.try_iter().collect()
}

pub fn of_kind(notes: &[Notification], kind: NotificationKind) -> Vec<Notification> {
    notes.iter().filter(|n| n.kind() == kind).cloned().collect()
}
