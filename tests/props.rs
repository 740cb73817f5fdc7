mod common;

use common::{append_raw, fold_lines, location, transfer, voucher, JOURNAL_A};
use journalfold::{Fingerprint, Inventory, JournalFile, JournalReader};
use proptest::prelude::*;
use std::collections::HashMap;
use tempfile::tempdir;

fn arb_commodity() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("gold"), Just("silver"), Just("painite")]
}

fn arb_line() -> impl Strategy<Value = String> {
    prop_oneof![
        (arb_commodity(), 1u32..20).prop_map(|(c, n)| transfer(c, n, "toship")),
        (arb_commodity(), 1u32..20).prop_map(|(c, n)| transfer(c, n, "tocarrier")),
        (0u64..5).prop_map(|a| location(&format!("System {a}"), a + 1)),
        (1i64..10_000).prop_map(voucher),
    ]
}

fn arb_lines() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(arb_line(), 0..30)
}

// For any sequence of lines written in arbitrary fragments, reading them
// incrementally yields the same lines, and so the same folded state, as one
// batch read.
proptest! {
    #[test]
    fn prop_order_preserved_across_split_writes(
        lines in arb_lines(),
        cuts in proptest::collection::vec(1usize..64, 1..20),
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_A);
        let text: String = lines.iter().map(|l| format!("{l}\n")).collect();

        let mut reader = JournalReader::attach(JournalFile::new(&path).unwrap());
        let mut read = Vec::new();
        let mut rest = text.as_str();
        let mut cut = cuts.iter().cycle();
        while !rest.is_empty() {
            let mut at = (*cut.next().unwrap()).min(rest.len());
            while !rest.is_char_boundary(at) {
                at += 1;
            }
            let (chunk, tail) = rest.split_at(at);
            append_raw(&path, chunk);
            rest = tail;
            read.extend(reader.read_new_lines().into_iter().map(|l| l.text));
        }
        read.extend(reader.read_new_lines().into_iter().map(|l| l.text));

        prop_assert_eq!(&read, &lines);
        prop_assert_eq!(reader.pending_len(), 0);
        prop_assert_eq!(reader.journal().offset(), text.len() as u64);
        prop_assert_eq!(fold_lines(&read), fold_lines(&lines));
    }
}

// Cargo quantities never go negative and a commodity disappears once it
// reaches zero.
proptest! {
    #[test]
    fn prop_cargo_floor_invariant(
        moves in proptest::collection::vec((0usize..3, -20i64..20), 0..60),
    ) {
        const NAMES: [&str; 3] = ["gold", "silver", "painite"];
        let mut model: HashMap<&str, i64> = HashMap::new();
        let mut lines = Vec::new();
        for (name, delta) in moves {
            if delta == 0 {
                continue;
            }
            let direction = if delta > 0 { "toship" } else { "tocarrier" };
            lines.push(transfer(NAMES[name], delta.unsigned_abs() as u32, direction));
            let qty = model.entry(NAMES[name]).or_default();
            *qty = (*qty + delta).max(0);
        }

        let state = fold_lines(&lines);
        for name in NAMES {
            let expected = model.get(name).copied().unwrap_or(0);
            match state.cargo.get(name) {
                Some(qty) => {
                    prop_assert!(*qty > 0);
                    prop_assert_eq!(i64::from(*qty), expected);
                }
                None => prop_assert_eq!(expected, 0),
            }
        }
    }
}

// Inventories with the same contents fingerprint identically whatever their
// insertion order, and any single quantity change alters the fingerprint.
proptest! {
    #[test]
    fn prop_fingerprint_stability(
        entries in proptest::collection::hash_map("[a-z]{1,8}", 1u32..1000, 1..12),
        pick in any::<prop::sample::Index>(),
        bump in 1u32..5,
    ) {
        let items: Vec<(String, u32)> = entries.into_iter().collect();

        let forward: Inventory = items.iter().cloned().collect();
        let backward: Inventory = items.iter().rev().cloned().collect();
        prop_assert_eq!(
            Fingerprint::of_inventory(&forward),
            Fingerprint::of_inventory(&backward)
        );

        let (name, qty) = &items[pick.index(items.len())];
        let mut changed = forward.clone();
        changed.insert(name.clone(), qty + bump);
        prop_assert_ne!(
            Fingerprint::of_inventory(&forward),
            Fingerprint::of_inventory(&changed)
        );
    }
}
