use crate::event::{EventBody, Ingredient, JournalEvent, MaterialChange, TransferDirection};
use crate::notification::Notification;
use crate::state::{self, Identity, SessionState};
use log::debug;
use std::collections::HashSet;

/// Commodity key under which limpets are held in cargo.
pub const LIMPETS: &str = "drones";

/// Folds decoded events into a [`SessionState`].
///
/// Owns the visited-systems set, which outlives session resets. An external
/// collaborator can seed it with [`with_visited`](Self::with_visited) and
/// read it back with [`visited`](Self::visited) to persist it.
///
/// # Examples
///
/// ```
/// use journalfold::{decode, FoldEngine, Notification, SessionState};
///
/// let mut engine = FoldEngine::new();
/// let event = decode(r#"{"event":"RedeemVoucher","Amount":1000}"#).unwrap();
///
/// let (state, notes) = engine.apply(SessionState::default(), &event);
/// assert_eq!(state.balance, 1000);
/// assert_eq!(notes, vec![Notification::Balance(1000)]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct FoldEngine {
    visited: HashSet<u64>,
}

impl FoldEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the visited-systems set with [`StarSystem::visit_key`] values.
    ///
    /// [`StarSystem::visit_key`]: crate::StarSystem::visit_key
    pub fn with_visited(visited: impl IntoIterator<Item = u64>) -> Self {
        FoldEngine {
            visited: visited.into_iter().collect(),
        }
    }

    pub fn visited(&self) -> impl Iterator<Item = u64> + '_ {
        self.visited.iter().copied()
    }

    /// Fold `event` into owned state, returning the new state and the
    /// notifications describing the change.
    pub fn apply(
        &mut self,
        mut state: SessionState,
        event: &JournalEvent,
    ) -> (SessionState, Vec<Notification>) {
        let notes = self.apply_mut(&mut state, event);
        (state, notes)
    }

    /// In-place form of [`apply`](Self::apply).
    pub fn apply_mut(
        &mut self,
        state: &mut SessionState,
        event: &JournalEvent,
    ) -> Vec<Notification> {
        let mut notes = Vec::new();

        match &event.body {
            EventBody::FileHeader { part, .. } => {
                if *part == 1 {
                    reset(state, &mut notes);
                }
            }
            EventBody::Commander { name, fid } => {
                if state
                    .identity
                    .as_ref()
                    .is_some_and(|id| id.is_other_commander(name, fid))
                {
                    reset(state, &mut notes);
                }
                let identity = state.identity.get_or_insert_with(Identity::default);
                identity.commander = name.clone();
                identity.fid = fid.clone();
                notes.push(Notification::Identity(identity.clone()));
            }
            EventBody::LoadGame { identity, credits } => {
                if state
                    .identity
                    .as_ref()
                    .is_some_and(|id| id.is_other_commander(&identity.commander, &identity.fid))
                {
                    reset(state, &mut notes);
                }
                state.identity = Some(identity.clone());
                notes.push(Notification::Identity(identity.clone()));
                set_balance(state, *credits, &mut notes);
            }
            EventBody::Location(system) => {
                let newly_visited = self.visited.insert(system.visit_key());
                state.system = Some(system.clone());
                notes.push(Notification::Location {
                    system: system.clone(),
                    newly_visited,
                });
            }
            EventBody::Loadout(loadout) => {
                state.loadout = Some(loadout.clone());
                if let Some(identity) = state.identity.as_mut() {
                    identity.ship = loadout.ship.clone();
                    identity.ship_id = loadout.ship_id;
                }
                notes.push(Notification::Loadout(loadout.clone()));
            }
            EventBody::Cargo {
                vessel,
                inventory,
                display_names,
            } => match inventory {
                Some(inventory) if vessel.is_empty() || vessel.eq_ignore_ascii_case("ship") => {
                    state.display_names.extend(display_names.clone());
                    state.cargo = inventory.clone();
                    notes.push(Notification::Cargo(state.cargo.clone()));
                }
                Some(_) => debug!("journalfold: ignoring cargo snapshot for {vessel}"),
                None => {}
            },
            EventBody::CargoTransfer { transfers } => {
                for transfer in transfers {
                    learn_name(state, &transfer.commodity, transfer.display_name.as_ref());
                    let delta = match transfer.direction {
                        TransferDirection::ToShip => i64::from(transfer.count),
                        TransferDirection::Away => -i64::from(transfer.count),
                    };
                    state::adjust(&mut state.cargo, &transfer.commodity, delta);
                }
                notes.push(Notification::Cargo(state.cargo.clone()));
            }
            EventBody::MarketBuy {
                commodity,
                count,
                total_cost,
            } => {
                add_balance(state, -*total_cost, &mut notes);
                adjust_cargo(state, commodity, i64::from(*count), &mut notes);
            }
            EventBody::MarketSell {
                commodity,
                count,
                total_sale,
            } => {
                add_balance(state, *total_sale, &mut notes);
                adjust_cargo(state, commodity, -i64::from(*count), &mut notes);
            }
            EventBody::BuyDrones { count, total_cost } => {
                add_balance(state, -*total_cost, &mut notes);
                adjust_cargo(state, LIMPETS, i64::from(*count), &mut notes);
            }
            EventBody::SellDrones { count, total_sale } => {
                add_balance(state, *total_sale, &mut notes);
                adjust_cargo(state, LIMPETS, -i64::from(*count), &mut notes);
            }
            EventBody::CollectCargo { commodity } => {
                adjust_cargo(state, commodity, 1, &mut notes);
            }
            EventBody::EjectCargo { commodity, count } => {
                adjust_cargo(state, commodity, -i64::from(*count), &mut notes);
            }
            EventBody::MiningRefined { commodity } => {
                adjust_cargo(state, commodity, 1, &mut notes);
                notes.push(Notification::Refined {
                    commodity: commodity.clone(),
                });
            }
            EventBody::LaunchDrone { drone } => {
                adjust_cargo(state, LIMPETS, -1, &mut notes);
                notes.push(Notification::DroneLaunched {
                    drone: drone.clone(),
                });
            }
            EventBody::RedeemVoucher { amount } => add_balance(state, *amount, &mut notes),
            EventBody::PayFines { amount } => add_balance(state, -*amount, &mut notes),
            EventBody::Materials(materials) => {
                state.materials = materials.clone();
                notes.push(Notification::Materials(state.materials.clone()));
            }
            EventBody::MaterialCollected(change) => {
                adjust_material(state, change, i64::from(change.count));
                notes.push(Notification::MaterialsCollected(change.clone()));
                notes.push(Notification::Materials(state.materials.clone()));
            }
            EventBody::MaterialDiscarded(change) => {
                adjust_material(state, change, -i64::from(change.count));
                notes.push(Notification::MaterialsDiscarded(change.clone()));
                notes.push(Notification::Materials(state.materials.clone()));
            }
            EventBody::MaterialTrade { paid, received } => {
                adjust_material(state, paid, -i64::from(paid.count));
                adjust_material(state, received, i64::from(received.count));
                notes.push(Notification::MaterialsTraded {
                    paid: paid.clone(),
                    received: received.clone(),
                });
                notes.push(Notification::Materials(state.materials.clone()));
            }
            EventBody::EngineerCraft {
                blueprint,
                ingredients,
                ..
            } => consume(state, blueprint, ingredients, &mut notes),
            EventBody::Synthesis { name, ingredients } => {
                consume(state, name, ingredients, &mut notes);
            }
            EventBody::Docked(station) => {
                state.station = Some(station.clone());
                state.docked = true;
                notes.push(Notification::Docked(station.clone()));
            }
            EventBody::Undocked { station } => {
                state.docked = false;
                notes.push(Notification::Undocked {
                    station: station.clone(),
                });
            }
            EventBody::Status(status) => {
                state.status = Some(status.clone());
                notes.push(Notification::Status(status.clone()));
                if let Some(balance) = status.balance.filter(|b| *b != state.balance) {
                    set_balance(state, balance, &mut notes);
                }
            }
            EventBody::Shutdown | EventBody::Unrecognized { .. } => {}
        }

        notes
    }
}

fn reset(state: &mut SessionState, notes: &mut Vec<Notification>) {
    *state = SessionState::default();
    notes.push(Notification::SessionReset);
}

fn set_balance(state: &mut SessionState, balance: i64, notes: &mut Vec<Notification>) {
    state.balance = balance;
    notes.push(Notification::Balance(balance));
}

fn add_balance(state: &mut SessionState, delta: i64, notes: &mut Vec<Notification>) {
    set_balance(state, state.balance.saturating_add(delta), notes);
}

fn adjust_cargo(
    state: &mut SessionState,
    commodity: &str,
    delta: i64,
    notes: &mut Vec<Notification>,
) {
    state::adjust(&mut state.cargo, commodity, delta);
    notes.push(Notification::Cargo(state.cargo.clone()));
}

fn learn_name(state: &mut SessionState, name: &str, display_name: Option<&String>) {
    if let Some(display) = display_name {
        state
            .display_names
            .insert(name.to_string(), display.clone());
    }
}

fn adjust_material(state: &mut SessionState, change: &MaterialChange, delta: i64) {
    learn_name(state, &change.name, change.display_name.as_ref());
    let category = change
        .category
        .or_else(|| state.materials.locate(&change.name));
    match category {
        Some(category) => {
            state::adjust(state.materials.category_mut(category), &change.name, delta);
        }
        None => debug!(
            "journalfold: no category for material {}, leaving inventory unchanged",
            change.name
        ),
    }
}

fn consume(
    state: &mut SessionState,
    source: &str,
    ingredients: &[Ingredient],
    notes: &mut Vec<Notification>,
) {
    for ingredient in ingredients {
        if let Some(category) = state.materials.locate(&ingredient.name) {
            state::adjust(
                state.materials.category_mut(category),
                &ingredient.name,
                -i64::from(ingredient.count),
            );
        }
    }
    notes.push(Notification::MaterialsCrafted {
        source: source.to_string(),
        consumed: ingredients.to_vec(),
    });
    notes.push(Notification::Materials(state.materials.clone()));
}
