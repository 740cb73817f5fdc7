mod common;

use common::{fold_lines, header, load_game, location, record, transfer, voucher};
use journalfold::{
    adjust, decode, FoldEngine, Inventory, Notification, NotificationKind, SessionState,
    StarSystem, LIMPETS,
};
use serde_json::json;

fn apply(engine: &mut FoldEngine, state: &mut SessionState, line: &str) -> Vec<Notification> {
    engine.apply_mut(state, &decode(line).unwrap())
}

#[test]
fn test_location_marks_first_visit() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();

    let notes = apply(&mut engine, &mut state, &location("Sol", 10477373803));
    assert_eq!(notes.len(), 1);
    match &notes[0] {
        Notification::Location {
            system,
            newly_visited,
        } => {
            assert_eq!(system.name, "Sol");
            assert!(newly_visited);
        }
        other => panic!("unexpected {other:?}"),
    }

    apply(&mut engine, &mut state, &location("Achenar", 164098653));
    let notes = apply(&mut engine, &mut state, &location("Sol", 10477373803));
    assert!(matches!(
        notes[0],
        Notification::Location {
            newly_visited: false,
            ..
        }
    ));
    assert_eq!(state.system.as_ref().unwrap().name, "Sol");
}

#[test]
fn test_visited_set_can_be_seeded() {
    let sol = StarSystem {
        name: "Sol".to_string(),
        address: 10477373803,
        ..Default::default()
    };
    let mut engine = FoldEngine::with_visited([sol.visit_key()]);
    let mut state = SessionState::default();

    let notes = apply(&mut engine, &mut state, &location("Sol", 10477373803));
    assert!(matches!(
        notes[0],
        Notification::Location {
            newly_visited: false,
            ..
        }
    ));
    assert_eq!(engine.visited().count(), 1);
}

#[test]
fn test_visit_key_falls_back_to_name() {
    let a = StarSystem {
        name: "Sol".to_string(),
        ..Default::default()
    };
    let b = StarSystem {
        name: "SOL".to_string(),
        ..Default::default()
    };
    assert_eq!(a.visit_key(), b.visit_key());
}

#[test]
fn test_cargo_transfer_add_then_remove() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();

    let notes = apply(&mut engine, &mut state, &transfer("Gold", 5, "toship"));
    let mut expected = Inventory::new();
    expected.insert("gold".to_string(), 5);
    assert_eq!(notes, vec![Notification::Cargo(expected)]);

    let notes = apply(&mut engine, &mut state, &transfer("Gold", 5, "tocarrier"));
    assert_eq!(notes, vec![Notification::Cargo(Inventory::new())]);
    assert!(!state.cargo.contains_key("gold"));
}

#[test]
fn test_cargo_remove_floors_at_zero() {
    let state = fold_lines(&[
        transfer("gold", 2, "toship"),
        record("EjectCargo", json!({"Type": "gold", "Count": 10})),
    ]);
    assert!(state.cargo.is_empty());
}

#[test]
fn test_adjust_floor_and_removal() {
    let mut inventory = Inventory::new();
    assert_eq!(adjust(&mut inventory, "gold", 3), 3);
    assert_eq!(adjust(&mut inventory, "gold", -1), 2);
    assert_eq!(adjust(&mut inventory, "gold", -7), 0);
    assert!(inventory.is_empty());
    assert_eq!(adjust(&mut inventory, "silver", -1), 0);
    assert!(inventory.is_empty());
}

#[test]
fn test_cargo_snapshot_replaces_inventory() {
    let state = fold_lines(&[
        transfer("gold", 2, "toship"),
        record(
            "Cargo",
            json!({"Vessel": "Ship", "Inventory": [{"Name": "painite", "Count": 8}]}),
        ),
    ]);
    assert_eq!(state.cargo.len(), 1);
    assert_eq!(state.cargo["painite"], 8);
}

#[test]
fn test_display_names_are_learned() {
    let state = fold_lines(&[
        record(
            "Cargo",
            json!({"Vessel": "Ship", "Inventory": [
                {"Name": "$Drones_Name;", "Name_Localised": "Limpet", "Count": 4}
            ]}),
        ),
        record(
            "CargoTransfer",
            json!({"Transfers": [
                {"Type": "lowtemperaturediamond", "Type_Localised": "Low Temperature Diamonds",
                 "Count": 2, "Direction": "toship"}
            ]}),
        ),
        record(
            "MaterialCollected",
            json!({"Category": "Raw", "Name": "iron", "Name_Localised": "Iron", "Count": 1}),
        ),
    ]);
    assert_eq!(state.display_names["drones"], "Limpet");
    assert_eq!(
        state.display_names["lowtemperaturediamond"],
        "Low Temperature Diamonds"
    );
    assert_eq!(state.display_names["iron"], "Iron");
    assert_eq!(state.cargo["lowtemperaturediamond"], 2);
}

#[test]
fn test_srv_cargo_snapshot_is_ignored() {
    let state = fold_lines(&[
        transfer("gold", 2, "toship"),
        record(
            "Cargo",
            json!({"Vessel": "SRV", "Inventory": [{"Name": "painite", "Count": 1}]}),
        ),
    ]);
    assert_eq!(state.cargo["gold"], 2);
    assert!(!state.cargo.contains_key("painite"));
}

#[test]
fn test_market_trades_move_balance_and_cargo() {
    let state = fold_lines(&[
        load_game("Jameson", 10_000),
        record(
            "MarketBuy",
            json!({"Type": "gold", "Count": 4, "TotalCost": 4000}),
        ),
        record(
            "MarketSell",
            json!({"Type": "gold", "Count": 1, "TotalSale": 1500}),
        ),
    ]);
    assert_eq!(state.balance, 7_500);
    assert_eq!(state.cargo["gold"], 3);
}

#[test]
fn test_balance_vouchers_and_fines() {
    let state = fold_lines(&[
        voucher(1_000),
        record("PayFines", json!({"Amount": 300})),
    ]);
    assert_eq!(state.balance, 700);
}

#[test]
fn test_status_balance_only_emits_on_change() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(&mut engine, &mut state, &load_game("Jameson", 500));

    let same = record("Status", json!({"Flags": 1, "Balance": 500}));
    let notes = apply(&mut engine, &mut state, &same);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind(), NotificationKind::Status);

    let changed = record("Status", json!({"Flags": 1, "Balance": 900}));
    let notes = apply(&mut engine, &mut state, &changed);
    assert_eq!(notes.last(), Some(&Notification::Balance(900)));
    assert_eq!(state.balance, 900);
}

#[test]
fn test_drones_and_mining_refined() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();

    apply(
        &mut engine,
        &mut state,
        &record("BuyDrones", json!({"Type": "Drones", "Count": 10, "TotalCost": 1010})),
    );
    assert_eq!(state.cargo[LIMPETS], 10);
    assert_eq!(state.balance, -1010);

    let notes = apply(
        &mut engine,
        &mut state,
        &record("LaunchDrone", json!({"Type": "Prospector"})),
    );
    assert_eq!(state.cargo[LIMPETS], 9);
    assert_eq!(
        notes.last(),
        Some(&Notification::DroneLaunched {
            drone: "prospector".to_string()
        })
    );

    let notes = apply(
        &mut engine,
        &mut state,
        &record("MiningRefined", json!({"Type": "$painite_name;"})),
    );
    assert_eq!(state.cargo["painite"], 1);
    assert_eq!(
        notes.last(),
        Some(&Notification::Refined {
            commodity: "painite".to_string()
        })
    );
}

#[test]
fn test_fileheader_part_one_resets_session() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(&mut engine, &mut state, &load_game("Jameson", 500));
    apply(&mut engine, &mut state, &transfer("gold", 1, "toship"));

    let notes = apply(&mut engine, &mut state, &header(2));
    assert!(notes.is_empty());
    assert_eq!(state.balance, 500);

    let notes = apply(&mut engine, &mut state, &header(1));
    assert_eq!(notes, vec![Notification::SessionReset]);
    assert_eq!(state, SessionState::default());
}

#[test]
fn test_different_commander_resets_session() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(&mut engine, &mut state, &load_game("Jameson", 500));
    apply(&mut engine, &mut state, &transfer("gold", 1, "toship"));

    let other = record(
        "LoadGame",
        json!({"Commander": "Kurtz", "FID": "F200", "Credits": 42}),
    );
    let notes = apply(&mut engine, &mut state, &other);
    assert_eq!(notes[0], Notification::SessionReset);
    assert!(state.cargo.is_empty());
    assert_eq!(state.balance, 42);
    assert_eq!(state.identity.as_ref().unwrap().commander, "Kurtz");
}

#[test]
fn test_same_commander_keeps_session() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(&mut engine, &mut state, &load_game("Jameson", 500));
    apply(&mut engine, &mut state, &transfer("gold", 1, "toship"));

    let notes = apply(
        &mut engine,
        &mut state,
        &record("Commander", json!({"Name": "Jameson", "FID": "F100"})),
    );
    assert!(!notes.contains(&Notification::SessionReset));
    assert_eq!(state.cargo["gold"], 1);
}

#[test]
fn test_loadout_updates_identity_ship() {
    let state = fold_lines(&[
        load_game("Jameson", 0),
        record(
            "Loadout",
            json!({"Ship": "Krait_MkII", "ShipID": 7, "ShipName": "Nomad",
                   "Modules": [{"Slot": "Armour", "Item": "Krait_MkII_Armour_Grade1"}]}),
        ),
    ]);
    let identity = state.identity.unwrap();
    assert_eq!(identity.ship, "krait_mkii");
    assert_eq!(identity.ship_id, 7);
    assert_eq!(state.loadout.unwrap().modules.len(), 1);
}

#[test]
fn test_materials_collect_discard_and_trade() {
    let state = fold_lines(&[
        record(
            "Materials",
            json!({"Raw": [{"Name": "iron", "Count": 10}], "Manufactured": [], "Encoded": []}),
        ),
        record(
            "MaterialCollected",
            json!({"Category": "Raw", "Name": "iron", "Count": 2}),
        ),
        record(
            "MaterialDiscarded",
            json!({"Category": "Raw", "Name": "iron", "Count": 1}),
        ),
        record(
            "MaterialTrade",
            json!({"Paid": {"Material": "iron", "Category": "Raw", "Quantity": 6},
                   "Received": {"Material": "nickel", "Category": "Raw", "Quantity": 1}}),
        ),
    ]);
    assert_eq!(state.materials.raw["iron"], 5);
    assert_eq!(state.materials.raw["nickel"], 1);
}

#[test]
fn test_crafting_consumes_from_owning_category() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(
        &mut engine,
        &mut state,
        &record(
            "Materials",
            json!({"Raw": [{"Name": "sulphur", "Count": 3}],
                   "Encoded": [{"Name": "shieldcyclerecordings", "Count": 1}]}),
        ),
    );

    let notes = apply(
        &mut engine,
        &mut state,
        &record(
            "Synthesis",
            json!({"Name": "FSD Basic", "Materials": [
                {"Name": "sulphur", "Count": 1},
                {"Name": "shieldcyclerecordings", "Count": 1}
            ]}),
        ),
    );
    assert_eq!(state.materials.raw["sulphur"], 2);
    assert!(state.materials.encoded.is_empty());
    assert_eq!(notes[0].kind(), NotificationKind::MaterialsCrafted);
    assert_eq!(notes[1], Notification::Materials(state.materials.clone()));
}

#[test]
fn test_docking_tracks_station() {
    let mut engine = FoldEngine::new();
    let mut state = SessionState::default();
    apply(
        &mut engine,
        &mut state,
        &record(
            "Docked",
            json!({"StationName": "Ray Gateway", "StarSystem": "Diaguandri"}),
        ),
    );
    assert!(state.docked);
    assert_eq!(state.station.as_ref().unwrap().name, "Ray Gateway");

    let notes = apply(
        &mut engine,
        &mut state,
        &record("Undocked", json!({"StationName": "Ray Gateway"})),
    );
    assert!(!state.docked);
    assert_eq!(
        notes,
        vec![Notification::Undocked {
            station: "Ray Gateway".to_string()
        }]
    );
}

#[test]
fn test_unrecognized_and_shutdown_change_nothing() {
    let mut engine = FoldEngine::new();
    let (state, notes) = engine.apply(
        SessionState::default(),
        &decode(&record("Scanned", json!({}))).unwrap(),
    );
    assert!(notes.is_empty());
    assert_eq!(state, SessionState::default());

    let (state, notes) = engine.apply(state, &decode(&record("Shutdown", json!({}))).unwrap());
    assert!(notes.is_empty());
    assert_eq!(state, SessionState::default());
}
