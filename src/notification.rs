//! Change notifications and the per-kind publish/subscribe registry.

use crate::event::{Ingredient, MaterialChange};
use crate::mining::Reminder;
use crate::state::{Identity, Inventory, Loadout, Materials, StarSystem, StationContext, Status};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

/// Subscription key. One per [`Notification`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    Location,
    Balance,
    Cargo,
    Loadout,
    Identity,
    MaterialsCollected,
    MaterialsDiscarded,
    MaterialsTraded,
    MaterialsCrafted,
    Materials,
    Docked,
    Undocked,
    Status,
    DroneLaunched,
    Refined,
    SessionReset,
    Reminder,
}

impl NotificationKind {
    /// Whether an unchanged snapshot of this kind is suppressed by the
    /// [`DedupGate`](crate::DedupGate) even when it comes from a new line.
    ///
    /// Balance is a scalar and is always delivered. Deltas and occurrences
    /// (including [`Docked`](NotificationKind::Docked)) are never
    /// content-gated because two identical ones are two real changes.
    pub fn is_snapshot(self) -> bool {
        matches!(
            self,
            NotificationKind::Location
                | NotificationKind::Cargo
                | NotificationKind::Loadout
                | NotificationKind::Identity
                | NotificationKind::Materials
                | NotificationKind::Status
        )
    }
}

/// An immutable description of one state change.
///
/// Snapshot-shaped variants carry the full post-change slice so subscribers
/// never reconstruct state themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Location { system: StarSystem, newly_visited: bool },
    /// New absolute balance.
    Balance(i64),
    Cargo(Inventory),
    Loadout(Loadout),
    Identity(Identity),
    MaterialsCollected(MaterialChange),
    MaterialsDiscarded(MaterialChange),
    MaterialsTraded { paid: MaterialChange, received: MaterialChange },
    MaterialsCrafted { source: String, consumed: Vec<Ingredient> },
    Materials(Materials),
    Docked(StationContext),
    Undocked { station: String },
    Status(Status),
    DroneLaunched { drone: String },
    Refined { commodity: String },
    /// State was cleared at a session boundary. Always precedes the
    /// notifications of the record that caused it.
    SessionReset,
    Reminder(Reminder),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Location { .. } => NotificationKind::Location,
            Notification::Balance(_) => NotificationKind::Balance,
            Notification::Cargo(_) => NotificationKind::Cargo,
            Notification::Loadout(_) => NotificationKind::Loadout,
            Notification::Identity(_) => NotificationKind::Identity,
            Notification::MaterialsCollected(_) => NotificationKind::MaterialsCollected,
            Notification::MaterialsDiscarded(_) => NotificationKind::MaterialsDiscarded,
            Notification::MaterialsTraded { .. } => NotificationKind::MaterialsTraded,
            Notification::MaterialsCrafted { .. } => NotificationKind::MaterialsCrafted,
            Notification::Materials(_) => NotificationKind::Materials,
            Notification::Docked(_) => NotificationKind::Docked,
            Notification::Undocked { .. } => NotificationKind::Undocked,
            Notification::Status(_) => NotificationKind::Status,
            Notification::DroneLaunched { .. } => NotificationKind::DroneLaunched,
            Notification::Refined { .. } => NotificationKind::Refined,
            Notification::SessionReset => NotificationKind::SessionReset,
            Notification::Reminder(_) => NotificationKind::Reminder,
        }
    }
}

/// Publish/subscribe registry keyed by [`NotificationKind`].
///
/// Every subscriber owns an unbounded channel, so publishing never blocks
/// on a slow consumer. Subscribers that dropped their receiver are pruned
/// on the next publish. Cloning a `Bus` yields another handle to the same
/// registry.
///
/// # Examples
///
/// ```
/// use journalfold::{Bus, Notification, NotificationKind};
///
/// let bus = Bus::new();
/// let balances = bus.subscribe(NotificationKind::Balance);
///
/// bus.publish(Notification::Balance(1_000));
/// bus.publish(Notification::SessionReset);
///
/// assert_eq!(balances.try_recv().unwrap(), Notification::Balance(1_000));
/// assert!(balances.try_recv().is_err());
/// ```
#[derive(Clone, Default)]
pub struct Bus {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    /// `None` subscribes to every kind.
    kinds: Option<Vec<NotificationKind>>,
    tx: Sender<Notification>,
}

impl Subscriber {
    fn wants(&self, kind: NotificationKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one notification kind.
    pub fn subscribe(&self, kind: NotificationKind) -> Receiver<Notification> {
        self.register(Some(vec![kind]))
    }

    /// Subscribe to several kinds through one receiver, preserving their
    /// relative publish order.
    pub fn subscribe_many(&self, kinds: &[NotificationKind]) -> Receiver<Notification> {
        self.register(Some(kinds.to_vec()))
    }

    /// Subscribe to every kind.
    pub fn subscribe_all(&self) -> Receiver<Notification> {
        self.register(None)
    }

    /// Deliver `notification` to every interested subscriber.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub fn publish(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        registry.subscribers.retain(|sub| {
            if !sub.wants(kind) {
                return true;
            }
            match sub.tx.send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Number of subscribers interested in `kind`. Dropped receivers are
    /// only noticed by the next publish of a kind they wanted.
    pub fn subscriber_count(&self, kind: NotificationKind) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.iter().filter(|s| s.wants(kind)).count()
    }

    /// Drop every subscription. Receivers see the channel close once they
    /// have drained what was already delivered.
    pub fn close(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.clear();
    }

    fn register(&self, kinds: Option<Vec<NotificationKind>>) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.push(Subscriber { kinds, tx });
        rx
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Bus")
            .field("subscribers", &registry.subscribers.len())
            .finish()
    }
}
