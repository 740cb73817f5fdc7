//! Mining companion: limpet and refinery bookkeeping derived purely from
//! folded notifications.

use crate::fold::LIMPETS;
use crate::notification::{Bus, Notification, NotificationKind};
use log::info;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

/// Station services that can restock limpets unless configured otherwise.
pub const DEFAULT_RESTOCK_SERVICES: &[&str] = &["rearm", "commodities"];

/// Kinds the companion needs to see.
pub const MINING_KINDS: &[NotificationKind] = &[
    NotificationKind::SessionReset,
    NotificationKind::Cargo,
    NotificationKind::DroneLaunched,
    NotificationKind::Refined,
    NotificationKind::Docked,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reminder {
    /// Docked somewhere that sells limpets after using some.
    RestockLimpets { station: String, used: u32 },
}

/// Session-scoped mining counters.
///
/// Never reads journals; everything comes from notifications, so the same
/// figures result whether the session was tailed live or backfilled.
///
/// # Examples
///
/// ```
/// use journalfold::{MiningCompanion, Notification, Reminder, StationContext};
///
/// let mut mining = MiningCompanion::new();
/// mining.observe(&Notification::DroneLaunched { drone: "prospector".into() });
///
/// let station = StationContext {
///     name: "Jameson Memorial".into(),
///     services: vec!["Rearm".into()],
///     ..Default::default()
/// };
/// assert_eq!(
///     mining.observe(&Notification::Docked(station)),
///     Some(Reminder::RestockLimpets { station: "Jameson Memorial".into(), used: 1 })
/// );
/// ```
#[derive(Debug, Clone)]
pub struct MiningCompanion {
    restock_services: Vec<String>,
    launched: HashMap<String, u32>,
    refined: HashMap<String, u32>,
    limpets_aboard: u32,
}

impl Default for MiningCompanion {
    fn default() -> Self {
        Self::with_restock_services(DEFAULT_RESTOCK_SERVICES.iter().copied())
    }
}

impl MiningCompanion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_restock_services<S: Into<String>>(services: impl IntoIterator<Item = S>) -> Self {
        MiningCompanion {
            restock_services: services.into_iter().map(Into::into).collect(),
            launched: HashMap::new(),
            refined: HashMap::new(),
            limpets_aboard: 0,
        }
    }

    /// Limpets launched since the session started or the last restock.
    pub fn limpets_used(&self) -> u32 {
        self.launched.values().sum()
    }

    /// Launch counts by drone type since the last restock.
    pub fn launched(&self) -> &HashMap<String, u32> {
        &self.launched
    }

    /// Tons refined this session, by commodity.
    pub fn refined(&self) -> &HashMap<String, u32> {
        &self.refined
    }

    /// Update counters from one notification; returns a reminder when one
    /// is due.
    pub fn observe(&mut self, notification: &Notification) -> Option<Reminder> {
        match notification {
            Notification::SessionReset => {
                self.launched.clear();
                self.refined.clear();
                self.limpets_aboard = 0;
            }
            Notification::Cargo(cargo) => {
                let aboard = cargo.get(LIMPETS).copied().unwrap_or(0);
                if aboard > self.limpets_aboard {
                    self.launched.clear();
                }
                self.limpets_aboard = aboard;
            }
            Notification::DroneLaunched { drone } => {
                *self.launched.entry(drone.clone()).or_default() += 1;
            }
            Notification::Refined { commodity } => {
                *self.refined.entry(commodity.clone()).or_default() += 1;
            }
            Notification::Docked(station) => {
                let used = self.limpets_used();
                let can_restock = self.restock_services.iter().any(|s| station.offers(s));
                if used > 0 && can_restock {
                    return Some(Reminder::RestockLimpets {
                        station: station.name.clone(),
                        used,
                    });
                }
            }
            _ => {}
        }
        None
    }

    /// Subscribe on `bus` and run on a dedicated thread, publishing
    /// reminders back to the bus as [`Notification::Reminder`].
    ///
    /// The thread ends after [`Bus::close`] once the subscription drains,
    /// and returns the final counters.
    pub fn spawn(self, bus: &Bus) -> JoinHandle<MiningCompanion> {
        let rx = bus.subscribe_many(MINING_KINDS);
        let bus = bus.clone();
        thread::spawn(move || self.run(rx, &bus))
    }

    /// Drive the companion from `rx` until the channel closes.
    pub fn run(mut self, rx: Receiver<Notification>, bus: &Bus) -> MiningCompanion {
        for notification in rx {
            if let Some(reminder) = self.observe(&notification) {
                info!("journalfold: {reminder:?}");
                bus.publish(Notification::Reminder(reminder));
            }
        }
        self
    }
}
