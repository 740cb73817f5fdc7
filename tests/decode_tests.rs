mod common;

use common::record;
use journalfold::{decode, DecodeError, EventBody, MaterialCategory, TransferDirection};
use serde_json::json;

#[test]
fn test_decode_location_variants() {
    for kind in ["Location", "FSDJump", "CarrierJump"] {
        let line = record(
            kind,
            json!({"StarSystem": "Sol", "SystemAddress": 10477373803u64, "StarPos": [0.0, 1.5, -2.0]}),
        );
        let event = decode(&line).unwrap();
        match event.body {
            EventBody::Location(system) => {
                assert_eq!(system.name, "Sol");
                assert_eq!(system.address, 10477373803);
                assert_eq!(system.coordinates, [0.0, 1.5, -2.0]);
            }
            other => panic!("{kind} decoded as {other:?}"),
        }
    }
}

#[test]
fn test_decode_field_names_are_case_insensitive() {
    let event = decode(r#"{"EVENT":"RedeemVoucher","TimeStamp":"t","aMoUnT":250}"#).unwrap();
    assert_eq!(event.timestamp, "t");
    assert_eq!(event.body, EventBody::RedeemVoucher { amount: 250 });
}

#[test]
fn test_decode_missing_and_null_fields_default() {
    let event = decode(r#"{"event":"MarketSell","Type":null}"#).unwrap();
    assert_eq!(event.timestamp, "");
    assert_eq!(
        event.body,
        EventBody::MarketSell {
            commodity: String::new(),
            count: 0,
            total_sale: 0,
        }
    );
}

#[test]
fn test_decode_normalizes_commodity_names() {
    let line = record(
        "MarketBuy",
        json!({"Type": "$Painite_Name;", "Count": 4, "TotalCost": 1200}),
    );
    assert_eq!(
        decode(&line).unwrap().body,
        EventBody::MarketBuy {
            commodity: "painite".to_string(),
            count: 4,
            total_cost: 1200,
        }
    );
}

#[test]
fn test_decode_unrecognized_kind() {
    let event = decode(&record("Scanned", json!({"ScanType": "Cargo"}))).unwrap();
    assert_eq!(
        event.body,
        EventBody::Unrecognized {
            kind: "Scanned".to_string()
        }
    );
    assert_eq!(event.kind(), "Scanned");
}

#[test]
fn test_decode_malformed_line() {
    let err = decode(r#"{"event":"Cargo","#).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }), "{err:?}");
    assert_eq!(err.line(), r#"{"event":"Cargo","#);
}

#[test]
fn test_decode_non_object_is_malformed() {
    let err = decode("[1, 2, 3]").unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }), "{err:?}");
}

#[test]
fn test_decode_wrong_field_shape_is_malformed() {
    let err = decode(r#"{"event":"RedeemVoucher","Amount":"lots"}"#).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }), "{err:?}");
}

#[test]
fn test_decode_missing_kind() {
    let err = decode(r#"{"timestamp":"3310-01-01T00:00:00Z"}"#).unwrap_err();
    assert!(matches!(err, DecodeError::MissingKind { .. }), "{err:?}");
    let err = decode(r#"{"event":""}"#).unwrap_err();
    assert!(matches!(err, DecodeError::MissingKind { .. }), "{err:?}");
}

#[test]
fn test_decode_cargo_snapshot() {
    let line = record(
        "Cargo",
        json!({"Vessel": "Ship", "Count": 7, "Inventory": [
            {"Name": "gold", "Count": 5},
            {"Name": "$Drones_Name;", "Name_Localised": "Limpet", "Count": 2},
            {"Name": "silver", "Count": 0}
        ]}),
    );
    match decode(&line).unwrap().body {
        EventBody::Cargo {
            vessel,
            inventory,
            display_names,
        } => {
            assert_eq!(vessel, "Ship");
            let inventory = inventory.unwrap();
            assert_eq!(inventory.len(), 2);
            assert_eq!(inventory["gold"], 5);
            assert_eq!(inventory["drones"], 2);
            assert_eq!(display_names.len(), 1);
            assert_eq!(display_names["drones"], "Limpet");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_cargo_without_inventory() {
    let line = record("Cargo", json!({"Vessel": "Ship", "Count": 7}));
    assert_eq!(
        decode(&line).unwrap().body,
        EventBody::Cargo {
            vessel: "Ship".to_string(),
            inventory: None,
            display_names: Default::default(),
        }
    );
}

#[test]
fn test_decode_cargo_transfer_directions() {
    let line = record(
        "CargoTransfer",
        json!({"Transfers": [
            {"Type": "gold", "Type_Localised": "Gold", "Count": 3, "Direction": "toship"},
            {"Type": "silver", "Count": 1, "Direction": "tocarrier"}
        ]}),
    );
    match decode(&line).unwrap().body {
        EventBody::CargoTransfer { transfers } => {
            assert_eq!(transfers.len(), 2);
            assert_eq!(transfers[0].direction, TransferDirection::ToShip);
            assert_eq!(transfers[1].direction, TransferDirection::Away);
            assert_eq!(transfers[1].commodity, "silver");
            assert_eq!(transfers[0].display_name.as_deref(), Some("Gold"));
            assert_eq!(transfers[1].display_name, None);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_material_collected_category() {
    let line = record(
        "MaterialCollected",
        json!({"Category": "$MICRORESOURCE_CATEGORY_Encoded;", "Name": "shieldcyclerecordings", "Name_Localised": "Distorted Shield Cycle Recordings", "Count": 3}),
    );
    match decode(&line).unwrap().body {
        EventBody::MaterialCollected(change) => {
            assert_eq!(change.category, Some(MaterialCategory::Encoded));
            assert_eq!(change.name, "shieldcyclerecordings");
            assert_eq!(change.count, 3);
            assert_eq!(
                change.display_name.as_deref(),
                Some("Distorted Shield Cycle Recordings")
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_material_trade() {
    let line = record(
        "MaterialTrade",
        json!({
            "TraderType": "raw",
            "Paid": {"Material": "iron", "Category": "Raw", "Quantity": 6},
            "Received": {"Material": "nickel", "Category": "Raw", "Quantity": 1}
        }),
    );
    match decode(&line).unwrap().body {
        EventBody::MaterialTrade { paid, received } => {
            assert_eq!((paid.name.as_str(), paid.count), ("iron", 6));
            assert_eq!((received.name.as_str(), received.count), ("nickel", 1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_engineer_craft_ingredients() {
    let line = record(
        "EngineerCraft",
        json!({"Engineer": "Felicity Farseer", "BlueprintName": "Engine_Dirty", "Level": 1,
               "Ingredients": [{"Name": "sulphur", "Count": 1}]}),
    );
    match decode(&line).unwrap().body {
        EventBody::EngineerCraft {
            engineer,
            blueprint,
            ingredients,
        } => {
            assert_eq!(engineer, "Felicity Farseer");
            assert_eq!(blueprint, "Engine_Dirty");
            assert_eq!(ingredients.len(), 1);
            assert_eq!(ingredients[0].name, "sulphur");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_docked_services() {
    let line = record(
        "Docked",
        json!({"StationName": "Jameson Memorial", "StationType": "Orbis", "StarSystem": "Shinrarta Dezhra",
               "StationServices": ["dock", "Rearm", "commodities"]}),
    );
    match decode(&line).unwrap().body {
        EventBody::Docked(station) => {
            assert_eq!(station.name, "Jameson Memorial");
            assert!(station.offers("rearm"));
            assert!(!station.offers("shipyard"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_status_with_balance() {
    let line = record(
        "Status",
        json!({"Flags": 16842765u64, "GuiFocus": 0, "Fuel": {"FuelMain": 16.0, "FuelReservoir": 0.63},
               "Cargo": 12.0, "LegalState": "Clean", "Balance": 5000}),
    );
    match decode(&line).unwrap().body {
        EventBody::Status(status) => {
            assert_eq!(status.flags, 16842765);
            assert_eq!(status.fuel_main, 16.0);
            assert_eq!(status.balance, Some(5000));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_decode_fileheader_part_defaults_to_one() {
    let event = decode(r#"{"event":"Fileheader"}"#).unwrap();
    assert!(matches!(event.body, EventBody::FileHeader { part: 1, .. }));
}
