//! Content fingerprints and the notification dedup gate.

use crate::event::{Ingredient, MaterialChange};
use crate::journal::LineOrigin;
use crate::notification::{Notification, NotificationKind};
use crate::state::{Inventory, MaterialCategory, Materials};
use std::collections::HashMap;
use std::sync::Arc;
use xxhash_rust::xxh64::Xxh64;

/// Stable hash of a notification's content.
///
/// Mappings are hashed in sorted order, so two snapshots with the same
/// entries produce the same fingerprint whatever their insertion order.
///
/// ```
/// use journalfold::{Fingerprint, Inventory};
///
/// let mut a = Inventory::new();
/// a.insert("gold".to_string(), 5);
/// a.insert("silver".to_string(), 2);
///
/// let mut b = Inventory::new();
/// b.insert("silver".to_string(), 2);
/// b.insert("gold".to_string(), 5);
///
/// assert_eq!(Fingerprint::of_inventory(&a), Fingerprint::of_inventory(&b));
/// b.insert("gold".to_string(), 6);
/// assert_ne!(Fingerprint::of_inventory(&a), Fingerprint::of_inventory(&b));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn of_inventory(inventory: &Inventory) -> Self {
        let mut canon = Canon::new(NotificationKind::Cargo);
        canon.inventory(inventory);
        canon.finish()
    }

    /// Fingerprint of everything a subscriber would observe in
    /// `notification`, except the `newly_visited` flag of a location, which
    /// describes history rather than the location itself.
    pub fn of(notification: &Notification) -> Self {
        let mut canon = Canon::new(notification.kind());
        match notification {
            Notification::Location { system, .. } => {
                canon.str(&system.name).num(system.address);
                for c in system.coordinates {
                    canon.num(c.to_bits());
                }
            }
            Notification::Balance(balance) => {
                canon.signed(*balance);
            }
            Notification::Cargo(inventory) => {
                canon.inventory(inventory);
            }
            Notification::Loadout(loadout) => {
                canon
                    .str(&loadout.ship)
                    .num(loadout.ship_id)
                    .str(&loadout.ship_name);
                let mut modules: Vec<_> = loadout.modules.iter().collect();
                modules.sort_by(|a, b| (&a.slot, &a.item).cmp(&(&b.slot, &b.item)));
                canon.num(modules.len() as u64);
                for module in modules {
                    canon.str(&module.slot).str(&module.item);
                }
            }
            Notification::Identity(identity) => {
                canon
                    .str(&identity.commander)
                    .str(&identity.fid)
                    .str(&identity.ship)
                    .num(identity.ship_id);
            }
            Notification::MaterialsCollected(change) | Notification::MaterialsDiscarded(change) => {
                canon.change(change);
            }
            Notification::MaterialsTraded { paid, received } => {
                canon.change(paid).change(received);
            }
            Notification::MaterialsCrafted { source, consumed } => {
                canon.str(source).ingredients(consumed);
            }
            Notification::Materials(materials) => {
                canon.materials(materials);
            }
            Notification::Docked(station) => {
                canon
                    .str(&station.name)
                    .str(&station.station_type)
                    .str(&station.system);
                let mut services: Vec<String> =
                    station.services.iter().map(|s| s.to_lowercase()).collect();
                services.sort();
                canon.num(services.len() as u64);
                for service in &services {
                    canon.str(service);
                }
            }
            Notification::Undocked { station } => {
                canon.str(station);
            }
            Notification::Status(status) => {
                canon
                    .num(status.flags)
                    .num(u64::from(status.gui_focus))
                    .num(status.fuel_main.to_bits())
                    .num(status.fuel_reservoir.to_bits())
                    .num(status.cargo.to_bits())
                    .str(&status.legal_state);
                match status.balance {
                    Some(balance) => canon.num(1).signed(balance),
                    None => canon.num(0),
                };
            }
            Notification::DroneLaunched { drone } => {
                canon.str(drone);
            }
            Notification::Refined { commodity } => {
                canon.str(commodity);
            }
            Notification::SessionReset => {}
            Notification::Reminder(reminder) => {
                canon.str(&format!("{reminder:?}"));
            }
        }
        canon.finish()
    }
}

/// Length-prefixed streaming encoder, so adjacent fields cannot run into
/// each other.
struct Canon(Xxh64);

impl Canon {
    fn new(kind: NotificationKind) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.update(&[kind as u8]);
        Canon(hasher)
    }

    fn num(&mut self, n: u64) -> &mut Self {
        self.0.update(&n.to_le_bytes());
        self
    }

    fn signed(&mut self, n: i64) -> &mut Self {
        self.0.update(&n.to_le_bytes());
        self
    }

    fn str(&mut self, s: &str) -> &mut Self {
        self.num(s.len() as u64);
        self.0.update(s.as_bytes());
        self
    }

    fn inventory(&mut self, inventory: &Inventory) -> &mut Self {
        let mut entries: Vec<(&String, &u32)> = inventory.iter().collect();
        entries.sort();
        self.num(entries.len() as u64);
        for (name, count) in entries {
            self.str(name).num(u64::from(*count));
        }
        self
    }

    fn materials(&mut self, materials: &Materials) -> &mut Self {
        for category in MaterialCategory::ALL {
            self.inventory(materials.category(category));
        }
        self
    }

    fn change(&mut self, change: &MaterialChange) -> &mut Self {
        self.num(change.category.map_or(0, |c| c as u64 + 1))
            .str(&change.name)
            .num(u64::from(change.count))
    }

    fn ingredients(&mut self, ingredients: &[Ingredient]) -> &mut Self {
        self.num(ingredients.len() as u64);
        for ingredient in ingredients {
            self.str(&ingredient.name).num(u64::from(ingredient.count));
        }
        self
    }

    fn finish(&self) -> Fingerprint {
        Fingerprint(self.0.digest())
    }
}

/// Suppresses notifications that would tell subscribers nothing new.
///
/// Two rules apply:
///
/// * **Unchanged snapshot.** For snapshot-shaped kinds
///   ([`NotificationKind::is_snapshot`]) the last fingerprint per kind is
///   kept and an identical recurrence is dropped.
/// * **Replayed line.** The gate remembers, per journal file, how far it
///   has been consumed. Notifications folded from a line that starts below
///   that mark are dropped, whatever their kind. This is what makes
///   re-reading an already-processed journal silent. Memory is one offset
///   per journal file.
///
/// [`NotificationKind::Balance`] bypasses both rules: it is a scalar and is
/// always delivered, re-reads included.
///
/// A [`Notification::SessionReset`] that gets through clears the per-kind
/// fingerprints so the rebuilt state is announced in full. [`reset`]
/// clears everything.
///
/// [`reset`]: DedupGate::reset
#[derive(Debug, Default)]
pub struct DedupGate {
    last: HashMap<NotificationKind, Fingerprint>,
    consumed: HashMap<Arc<str>, u64>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-kind unchanged-fingerprint check. Records `fingerprint` as the
    /// latest for `kind` either way.
    pub fn should_emit(&mut self, kind: NotificationKind, fingerprint: Fingerprint) -> bool {
        self.last.insert(kind, fingerprint) != Some(fingerprint)
    }

    /// Whether the line at `origin` was already consumed from its journal.
    pub fn is_replay(&self, origin: &LineOrigin) -> bool {
        self.consumed
            .get(&origin.file)
            .is_some_and(|&end| origin.offset < end)
    }

    /// Record that the journal behind `origin` has been consumed up to
    /// `end`. The mark never moves backwards.
    pub fn consume(&mut self, origin: &LineOrigin, end: u64) {
        let mark = self.consumed.entry(Arc::clone(&origin.file)).or_default();
        *mark = (*mark).max(end);
    }

    /// Drop the consumed mark of `file`, for a journal that was truncated
    /// and is being read again from the start.
    pub fn forget(&mut self, file: &str) {
        self.consumed.remove(file);
    }

    /// Decide whether `notification` should be published. `replay` says
    /// whether its line was already consumed ([`is_replay`](Self::is_replay)).
    pub fn admit(&mut self, notification: &Notification, replay: bool) -> bool {
        let kind = notification.kind();
        if kind == NotificationKind::Balance {
            return true;
        }
        if replay {
            return false;
        }

        if kind.is_snapshot() && !self.should_emit(kind, Fingerprint::of(notification)) {
            return false;
        }
        if kind == NotificationKind::SessionReset {
            self.last.clear();
        }
        true
    }

    /// Forget everything; the next notification of every kind is emitted.
    pub fn reset(&mut self) {
        self.last.clear();
        self.consumed.clear();
    }

    /// Last admitted fingerprint for `kind`.
    pub fn last(&self, kind: NotificationKind) -> Option<Fingerprint> {
        self.last.get(&kind).copied()
    }

    /// Consumed mark of `file`, if any line of it has been processed.
    pub fn consumed(&self, file: &str) -> Option<u64> {
        self.consumed.get(file).copied()
    }
}
