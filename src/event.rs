use crate::error::DecodeError;
use crate::state::{
    DisplayNames, Identity, Inventory, Loadout, MaterialCategory, Materials, Module, StarSystem,
    StationContext, Status,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One decoded journal record.
///
/// Every record carries the producer's timestamp verbatim plus exactly one
/// [`EventBody`]. Kinds the decoder does not know become
/// [`EventBody::Unrecognized`] rather than being dropped, so they stay
/// visible in diagnostics.
///
/// # Examples
///
/// ```
/// use journalfold::{decode, EventBody};
///
/// let event = decode(r#"{"timestamp":"3310-01-01T00:00:00Z","event":"FSDJump","StarSystem":"Sol","SystemAddress":10477373803}"#).unwrap();
/// assert_eq!(event.timestamp, "3310-01-01T00:00:00Z");
/// match event.body {
///     EventBody::Location(system) => assert_eq!(system.name, "Sol"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    /// ISO-8601 timestamp as written by the producer. Empty if absent.
    pub timestamp: String,
    pub body: EventBody,
}

/// The closed set of event kinds this crate understands.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// First record of every journal file. Part 1 starts a new game session;
    /// higher parts continue the previous one.
    FileHeader { part: u32, game_version: String },
    Commander { name: String, fid: String },
    LoadGame { identity: Identity, credits: i64 },
    /// `Location`, `FSDJump` and `CarrierJump` all land here.
    Location(StarSystem),
    Loadout(Loadout),
    /// Full cargo snapshot. `inventory` is `None` when the record only
    /// announces that a side file was rewritten.
    Cargo {
        vessel: String,
        inventory: Option<Inventory>,
        display_names: DisplayNames,
    },
    CargoTransfer { transfers: Vec<Transfer> },
    MarketBuy { commodity: String, count: u32, total_cost: i64 },
    MarketSell { commodity: String, count: u32, total_sale: i64 },
    BuyDrones { count: u32, total_cost: i64 },
    SellDrones { count: u32, total_sale: i64 },
    CollectCargo { commodity: String },
    EjectCargo { commodity: String, count: u32 },
    MiningRefined { commodity: String },
    LaunchDrone { drone: String },
    RedeemVoucher { amount: i64 },
    PayFines { amount: i64 },
    /// Full materials snapshot.
    Materials(Materials),
    MaterialCollected(MaterialChange),
    MaterialDiscarded(MaterialChange),
    MaterialTrade { paid: MaterialChange, received: MaterialChange },
    EngineerCraft { engineer: String, blueprint: String, ingredients: Vec<Ingredient> },
    Synthesis { name: String, ingredients: Vec<Ingredient> },
    Docked(StationContext),
    Undocked { station: String },
    Status(Status),
    Shutdown,
    Unrecognized { kind: String },
}

impl JournalEvent {
    /// Short kind name, for logging.
    pub fn kind(&self) -> &str {
        match &self.body {
            EventBody::FileHeader { .. } => "FileHeader",
            EventBody::Commander { .. } => "Commander",
            EventBody::LoadGame { .. } => "LoadGame",
            EventBody::Location(_) => "Location",
            EventBody::Loadout(_) => "Loadout",
            EventBody::Cargo { .. } => "Cargo",
            EventBody::CargoTransfer { .. } => "CargoTransfer",
            EventBody::MarketBuy { .. } => "MarketBuy",
            EventBody::MarketSell { .. } => "MarketSell",
            EventBody::BuyDrones { .. } => "BuyDrones",
            EventBody::SellDrones { .. } => "SellDrones",
            EventBody::CollectCargo { .. } => "CollectCargo",
            EventBody::EjectCargo { .. } => "EjectCargo",
            EventBody::MiningRefined { .. } => "MiningRefined",
            EventBody::LaunchDrone { .. } => "LaunchDrone",
            EventBody::RedeemVoucher { .. } => "RedeemVoucher",
            EventBody::PayFines { .. } => "PayFines",
            EventBody::Materials(_) => "Materials",
            EventBody::MaterialCollected(_) => "MaterialCollected",
            EventBody::MaterialDiscarded(_) => "MaterialDiscarded",
            EventBody::MaterialTrade { .. } => "MaterialTrade",
            EventBody::EngineerCraft { .. } => "EngineerCraft",
            EventBody::Synthesis { .. } => "Synthesis",
            EventBody::Docked(_) => "Docked",
            EventBody::Undocked { .. } => "Undocked",
            EventBody::Status(_) => "Status",
            EventBody::Shutdown => "Shutdown",
            EventBody::Unrecognized { kind } => kind.as_str(),
        }
    }
}

/// A single material quantity change.
///
/// `category` is `None` when the record's label was missing or unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialChange {
    pub category: Option<MaterialCategory>,
    pub name: String,
    /// The record's `_Localised` name, if it carried one.
    pub display_name: Option<String>,
    pub count: u32,
}

/// A consumed crafting ingredient. Crafting records do not say which
/// category an ingredient belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    ToShip,
    Away,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub commodity: String,
    pub display_name: Option<String>,
    pub count: u32,
    pub direction: TransferDirection,
}

/// Normalize a commodity or material identifier.
///
/// Lower-cases and strips the `$…_name;` decoration some records use, so
/// `"$Painite_Name;"` and `"painite"` refer to the same key.
///
/// ```
/// use journalfold::normalize_name;
///
/// assert_eq!(normalize_name("$Painite_Name;"), "painite");
/// assert_eq!(normalize_name("Gold"), "gold");
/// ```
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stripped = lower.strip_prefix('$').unwrap_or(&lower);
    let stripped = stripped.strip_suffix("_name;").unwrap_or(stripped);
    stripped.to_string()
}

/// Decode one raw journal line.
///
/// Pure and stateless. Field names match case-insensitively and null or
/// missing fields take neutral defaults. Only a line that is not a JSON
/// object, or that names no event kind, fails.
///
/// # Errors
///
/// [`DecodeError::Malformed`] for invalid JSON, a non-object record, or a
/// field of the wrong shape; [`DecodeError::MissingKind`] when there is no
/// `event` field.
pub fn decode(raw: &str) -> Result<JournalEvent, DecodeError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| malformed(raw, e))?;
    let Value::Object(map) = fold_keys(value) else {
        return Err(malformed(raw, "not a JSON object"));
    };

    let kind = match map.get("event") {
        Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
        _ => {
            return Err(DecodeError::MissingKind {
                line: raw.to_string(),
            });
        }
    };
    let timestamp = map
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let record = Value::Object(map);

    let body = match kind.to_ascii_lowercase().as_str() {
        "fileheader" => {
            let r: RawFileHeader = fields(record, raw)?;
            EventBody::FileHeader {
                part: r.part.max(1),
                game_version: r.gameversion,
            }
        }
        "commander" => {
            let r: RawCommander = fields(record, raw)?;
            EventBody::Commander {
                name: r.name,
                fid: r.fid,
            }
        }
        "loadgame" => {
            let r: RawLoadGame = fields(record, raw)?;
            EventBody::LoadGame {
                identity: Identity {
                    commander: r.commander,
                    fid: r.fid,
                    ship: r.ship.to_lowercase(),
                    ship_id: r.shipid,
                },
                credits: r.credits,
            }
        }
        "location" | "fsdjump" | "carrierjump" => {
            let r: RawLocation = fields(record, raw)?;
            let mut coordinates = [0.0; 3];
            for (slot, value) in coordinates.iter_mut().zip(r.starpos) {
                *slot = value;
            }
            EventBody::Location(StarSystem {
                name: r.starsystem,
                address: r.systemaddress,
                coordinates,
            })
        }
        "loadout" => {
            let r: RawLoadout = fields(record, raw)?;
            EventBody::Loadout(Loadout {
                ship: r.ship.to_lowercase(),
                ship_id: r.shipid,
                ship_name: r.shipname,
                modules: r
                    .modules
                    .into_iter()
                    .map(|m| Module {
                        slot: m.slot,
                        item: m.item.to_lowercase(),
                    })
                    .collect(),
            })
        }
        "cargo" => {
            let r: RawCargo = fields(record, raw)?;
            let mut display_names = DisplayNames::new();
            let inventory = r.inventory.map(|items| {
                let mut inventory = Inventory::new();
                for item in items {
                    let name = normalize_name(&item.name);
                    if let Some(display) = localised(item.name_localised) {
                        display_names.insert(name.clone(), display);
                    }
                    if item.count > 0 {
                        *inventory.entry(name).or_default() += item.count;
                    }
                }
                inventory
            });
            EventBody::Cargo {
                vessel: r.vessel,
                inventory,
                display_names,
            }
        }
        "cargotransfer" => {
            let r: RawCargoTransfer = fields(record, raw)?;
            EventBody::CargoTransfer {
                transfers: r
                    .transfers
                    .into_iter()
                    .map(|t| Transfer {
                        commodity: normalize_name(&t.kind),
                        display_name: localised(t.type_localised),
                        count: t.count,
                        direction: if t.direction.eq_ignore_ascii_case("toship") {
                            TransferDirection::ToShip
                        } else {
                            TransferDirection::Away
                        },
                    })
                    .collect(),
            }
        }
        "marketbuy" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::MarketBuy {
                commodity: normalize_name(&r.kind),
                count: r.count,
                total_cost: r.totalcost,
            }
        }
        "marketsell" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::MarketSell {
                commodity: normalize_name(&r.kind),
                count: r.count,
                total_sale: r.totalsale,
            }
        }
        "buydrones" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::BuyDrones {
                count: r.count,
                total_cost: r.totalcost,
            }
        }
        "selldrones" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::SellDrones {
                count: r.count,
                total_sale: r.totalsale,
            }
        }
        "collectcargo" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::CollectCargo {
                commodity: normalize_name(&r.kind),
            }
        }
        "ejectcargo" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::EjectCargo {
                commodity: normalize_name(&r.kind),
                count: r.count,
            }
        }
        "miningrefined" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::MiningRefined {
                commodity: normalize_name(&r.kind),
            }
        }
        "launchdrone" => {
            let r: RawMarket = fields(record, raw)?;
            EventBody::LaunchDrone {
                drone: r.kind.to_lowercase(),
            }
        }
        "redeemvoucher" => {
            let r: RawAmount = fields(record, raw)?;
            EventBody::RedeemVoucher { amount: r.amount }
        }
        "payfines" => {
            let r: RawAmount = fields(record, raw)?;
            EventBody::PayFines { amount: r.amount }
        }
        "materials" => {
            let r: RawMaterials = fields(record, raw)?;
            EventBody::Materials(Materials {
                raw: collect_counts(r.raw),
                manufactured: collect_counts(r.manufactured),
                encoded: collect_counts(r.encoded),
            })
        }
        "materialcollected" => {
            let r: RawMaterialChange = fields(record, raw)?;
            EventBody::MaterialCollected(r.into())
        }
        "materialdiscarded" => {
            let r: RawMaterialChange = fields(record, raw)?;
            EventBody::MaterialDiscarded(r.into())
        }
        "materialtrade" => {
            let r: RawMaterialTrade = fields(record, raw)?;
            EventBody::MaterialTrade {
                paid: r.paid.into(),
                received: r.received.into(),
            }
        }
        "engineercraft" => {
            let r: RawEngineerCraft = fields(record, raw)?;
            EventBody::EngineerCraft {
                engineer: r.engineer,
                blueprint: r.blueprintname,
                ingredients: r.ingredients.into_iter().map(Ingredient::from).collect(),
            }
        }
        "synthesis" => {
            let r: RawSynthesis = fields(record, raw)?;
            EventBody::Synthesis {
                name: r.name,
                ingredients: r.materials.into_iter().map(Ingredient::from).collect(),
            }
        }
        "docked" => {
            let r: RawDocked = fields(record, raw)?;
            EventBody::Docked(StationContext {
                name: r.stationname,
                station_type: r.stationtype,
                system: r.starsystem,
                services: r.stationservices,
            })
        }
        "undocked" => {
            let r: RawDocked = fields(record, raw)?;
            EventBody::Undocked {
                station: r.stationname,
            }
        }
        "status" => {
            let r: RawStatus = fields(record, raw)?;
            EventBody::Status(Status {
                flags: r.flags,
                gui_focus: r.guifocus,
                fuel_main: r.fuel.fuelmain,
                fuel_reservoir: r.fuel.fuelreservoir,
                cargo: r.cargo,
                legal_state: r.legalstate,
                balance: r.balance,
            })
        }
        "shutdown" => EventBody::Shutdown,
        _ => EventBody::Unrecognized { kind },
    };

    Ok(JournalEvent { timestamp, body })
}

fn malformed(raw: &str, reason: impl ToString) -> DecodeError {
    DecodeError::Malformed {
        line: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn fields<T: DeserializeOwned>(record: Value, raw: &str) -> Result<T, DecodeError> {
    serde_json::from_value(record).map_err(|e| malformed(raw, e))
}

/// Lower-case every object key and drop null members, recursively.
fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.to_lowercase(), fold_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}

fn localised(name: String) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn collect_counts(items: Vec<RawNamedCount>) -> Inventory {
    let mut inventory = Inventory::new();
    for item in items {
        if item.count > 0 {
            *inventory.entry(normalize_name(&item.name)).or_default() += item.count;
        }
    }
    inventory
}

// Typed views over a key-folded record. Every field is optional.

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawFileHeader {
    part: u32,
    gameversion: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCommander {
    name: String,
    fid: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLoadGame {
    commander: String,
    fid: String,
    ship: String,
    shipid: u64,
    credits: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLocation {
    starsystem: String,
    systemaddress: u64,
    starpos: Vec<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLoadout {
    ship: String,
    shipid: u64,
    shipname: String,
    modules: Vec<RawModule>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawModule {
    slot: String,
    item: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCargo {
    vessel: String,
    inventory: Option<Vec<RawNamedCount>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawNamedCount {
    name: String,
    name_localised: String,
    count: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCargoTransfer {
    transfers: Vec<RawTransfer>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTransfer {
    #[serde(rename = "type")]
    kind: String,
    type_localised: String,
    count: u32,
    direction: String,
}

/// Shared by the market, drone, and cargo-handling records, which all name
/// their commodity in `Type`.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMarket {
    #[serde(rename = "type")]
    kind: String,
    count: u32,
    totalcost: i64,
    totalsale: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAmount {
    amount: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMaterials {
    raw: Vec<RawNamedCount>,
    manufactured: Vec<RawNamedCount>,
    encoded: Vec<RawNamedCount>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMaterialChange {
    category: String,
    name: String,
    name_localised: String,
    count: u32,
}

impl From<RawMaterialChange> for MaterialChange {
    fn from(r: RawMaterialChange) -> Self {
        MaterialChange {
            category: MaterialCategory::parse(&r.category),
            name: normalize_name(&r.name),
            display_name: localised(r.name_localised),
            count: r.count,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMaterialTrade {
    paid: RawTradeSide,
    received: RawTradeSide,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTradeSide {
    material: String,
    material_localised: String,
    category: String,
    quantity: u32,
}

impl From<RawTradeSide> for MaterialChange {
    fn from(r: RawTradeSide) -> Self {
        MaterialChange {
            category: MaterialCategory::parse(&r.category),
            name: normalize_name(&r.material),
            display_name: localised(r.material_localised),
            count: r.quantity,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEngineerCraft {
    engineer: String,
    blueprintname: String,
    ingredients: Vec<RawNamedCount>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSynthesis {
    name: String,
    materials: Vec<RawNamedCount>,
}

impl From<RawNamedCount> for Ingredient {
    fn from(r: RawNamedCount) -> Self {
        Ingredient {
            name: normalize_name(&r.name),
            count: r.count,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDocked {
    stationname: String,
    stationtype: String,
    starsystem: String,
    stationservices: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStatus {
    flags: u64,
    guifocus: u32,
    fuel: RawFuel,
    cargo: f64,
    legalstate: String,
    balance: Option<i64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawFuel {
    fuelmain: f64,
    fuelreservoir: f64,
}
