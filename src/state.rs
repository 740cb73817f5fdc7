//! The in-memory session snapshot rebuilt from journal events.
//!
//! Everything here is plain data. Only [`FoldEngine`](crate::FoldEngine)
//! mutates a [`SessionState`]; every other component reads it or receives
//! clones of its slices inside [`Notification`](crate::Notification)s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Commodity name → quantity. Names are normalized internal names
/// (lower case, no `$…_name;` decoration). Iteration order is irrelevant.
pub type Inventory = HashMap<String, u32>;

/// Normalized name → the `_Localised` display name records gave for it.
pub type DisplayNames = HashMap<String, String>;

/// A star system the ship is in or has jumped to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarSystem {
    pub name: String,
    /// Producer-assigned system identifier. Zero when the record had none.
    pub address: u64,
    pub coordinates: [f64; 3],
}

impl StarSystem {
    /// Key used for the visited-systems set.
    ///
    /// The system address when present, otherwise a hash of the lower-cased
    /// name, so records that omit the address still compare stably.
    pub fn visit_key(&self) -> u64 {
        if self.address != 0 {
            self.address
        } else {
            xxhash_rust::xxh64::xxh64(self.name.to_lowercase().as_bytes(), 0)
        }
    }
}

/// Commander and current ship identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub commander: String,
    /// Frontier id. Empty when the producer did not write one.
    pub fid: String,
    pub ship: String,
    pub ship_id: u64,
}

impl Identity {
    /// Whether `commander`/`fid` name a different commander than `self`.
    ///
    /// Compares ids when both sides carry one, names otherwise.
    pub fn is_other_commander(&self, commander: &str, fid: &str) -> bool {
        if !self.fid.is_empty() && !fid.is_empty() {
            self.fid != fid
        } else {
            !self.commander.eq_ignore_ascii_case(commander)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub slot: String,
    pub item: String,
}

/// Full ship loadout. Always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub ship: String,
    pub ship_id: u64,
    pub ship_name: String,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MaterialCategory {
    Raw,
    Manufactured,
    Encoded,
}

impl MaterialCategory {
    pub const ALL: [MaterialCategory; 3] = [
        MaterialCategory::Raw,
        MaterialCategory::Manufactured,
        MaterialCategory::Encoded,
    ];

    /// Parse a producer category label, case-insensitively.
    ///
    /// Accepts both plain labels (`"Raw"`) and the decorated form some
    /// records use (`"$MICRORESOURCE_CATEGORY_Encoded;"`).
    ///
    /// ```
    /// use journalfold::MaterialCategory;
    ///
    /// assert_eq!(MaterialCategory::parse("raw"), Some(MaterialCategory::Raw));
    /// assert_eq!(
    ///     MaterialCategory::parse("$MICRORESOURCE_CATEGORY_Encoded;"),
    ///     Some(MaterialCategory::Encoded)
    /// );
    /// assert_eq!(MaterialCategory::parse("Data"), None);
    /// ```
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        if label.contains("raw") {
            Some(MaterialCategory::Raw)
        } else if label.contains("manufactured") {
            Some(MaterialCategory::Manufactured)
        } else if label.contains("encoded") {
            Some(MaterialCategory::Encoded)
        } else {
            None
        }
    }
}

/// Engineering materials, partitioned by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materials {
    pub raw: Inventory,
    pub manufactured: Inventory,
    pub encoded: Inventory,
}

impl Materials {
    pub fn category(&self, category: MaterialCategory) -> &Inventory {
        match category {
            MaterialCategory::Raw => &self.raw,
            MaterialCategory::Manufactured => &self.manufactured,
            MaterialCategory::Encoded => &self.encoded,
        }
    }

    pub fn category_mut(&mut self, category: MaterialCategory) -> &mut Inventory {
        match category {
            MaterialCategory::Raw => &mut self.raw,
            MaterialCategory::Manufactured => &mut self.manufactured,
            MaterialCategory::Encoded => &mut self.encoded,
        }
    }

    /// Quantity of `name` in any category.
    pub fn count(&self, name: &str) -> u32 {
        MaterialCategory::ALL
            .iter()
            .filter_map(|c| self.category(*c).get(name))
            .sum()
    }

    /// The category currently holding `name`, if any.
    pub fn locate(&self, name: &str) -> Option<MaterialCategory> {
        MaterialCategory::ALL
            .into_iter()
            .find(|c| self.category(*c).contains_key(name))
    }
}

/// Last station the ship docked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationContext {
    pub name: String,
    pub station_type: String,
    pub system: String,
    pub services: Vec<String>,
}

impl StationContext {
    /// Case-insensitive service membership.
    pub fn offers(&self, service: &str) -> bool {
        self.services.iter().any(|s| s.eq_ignore_ascii_case(service))
    }
}

/// Periodic ship status tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub flags: u64,
    pub gui_focus: u32,
    pub fuel_main: f64,
    pub fuel_reservoir: f64,
    /// Tons of cargo aboard as reported by the status tick.
    pub cargo: f64,
    pub legal_state: String,
    pub balance: Option<i64>,
}

/// The authoritative snapshot of derived session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub system: Option<StarSystem>,
    pub balance: i64,
    pub cargo: Inventory,
    pub loadout: Option<Loadout>,
    pub materials: Materials,
    pub identity: Option<Identity>,
    pub station: Option<StationContext>,
    pub docked: bool,
    pub status: Option<Status>,
    /// Display names learned from cargo and material records.
    pub display_names: DisplayNames,
}

/// Add `delta` to the quantity of `name`, flooring at zero.
///
/// The key is removed once the quantity reaches zero, so an inventory never
/// holds zero entries. Returns the new quantity.
pub fn adjust(inventory: &mut Inventory, name: &str, delta: i64) -> u32 {
    let current = i64::from(inventory.get(name).copied().unwrap_or(0));
    let next = (current + delta).clamp(0, i64::from(u32::MAX));
    if next == 0 {
        inventory.remove(name);
        0
    } else {
        // Clamped to the u32 range above.
        let next = next as u32;
        inventory.insert(name.to_string(), next);
        next
    }
}
