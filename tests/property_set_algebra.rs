//! Property-based tests for set algebra and table invariants
//!
//! Every backend must agree with `BTreeSet` on membership; only performance
//! may differ.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tagtable_rs::{Backend, Element, EntryRef, IndexConfig, TagError, TagTable};

fn element(backend: Backend, ids: &BTreeSet<u64>) -> Element {
    Element::from_entries(backend, ids.iter().map(|&id| EntryRef::new(id, id as u32))).unwrap()
}

fn ids_strategy() -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::btree_set(0u64..200, 0..60)
}

fn backend_strategy() -> impl Strategy<Value = Backend> {
    prop_oneof![
        Just(Backend::Unsorted),
        Just(Backend::Sorted),
        Just(Backend::Treap),
    ]
}

proptest! {
    #[test]
    fn prop_union_matches_reference(
        backend in backend_strategy(),
        a in ids_strategy(),
        b in ids_strategy(),
    ) {
        let result = Element::union(&element(backend, &a), &element(backend, &b)).unwrap();
        let expected: Vec<u64> = a.union(&b).copied().collect();
        prop_assert_eq!(result.ids(), expected);
        prop_assert!(result.is_read_only());
    }

    #[test]
    fn prop_intersect_matches_reference(
        backend in backend_strategy(),
        a in ids_strategy(),
        b in ids_strategy(),
    ) {
        let result = Element::intersect(&element(backend, &a), &element(backend, &b)).unwrap();
        let expected: Vec<u64> = a.intersection(&b).copied().collect();
        prop_assert_eq!(result.ids(), expected);
    }

    #[test]
    fn prop_duplicate_insert_rejected(
        backend in backend_strategy(),
        ids in prop::collection::btree_set(0u64..500, 1..40),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut e = element(backend, &ids);
        let dup = *pick.get(&ids.iter().copied().collect::<Vec<_>>());
        let before = e.ids();

        let inserted = e.insert(EntryRef::new(dup, 0));
        prop_assert!(matches!(inserted, Err(TagError::Duplicate(id)) if id == dup));
        prop_assert_eq!(e.ids(), before);
    }

    #[test]
    fn prop_insert_remove_sequence(
        backend in backend_strategy(),
        ops in prop::collection::vec((any::<bool>(), 0u64..50), 1..200),
    ) {
        let mut e = Element::new(backend);
        let mut model = BTreeSet::new();

        for (insert, id) in ops {
            if insert {
                let ok = e.insert(EntryRef::new(id, 0)).is_ok();
                prop_assert_eq!(ok, model.insert(id));
            } else {
                let removed = e.remove(id).unwrap().is_some();
                prop_assert_eq!(removed, model.remove(&id));
            }
        }
        prop_assert_eq!(e.ids(), model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_backends_agree_on_queries(
        tags in prop::collection::vec(ids_strategy(), 3),
        expr in prop_oneof![
            Just("t0 & t1 | t2"),
            Just("t0 | t1 & t2"),
            Just("t0 & (t1 | t2)"),
            Just("(t0 + t1) / t2"),
        ],
    ) {
        let mut results = Vec::new();
        for backend in Backend::ALL {
            let mut table = TagTable::with_config(&IndexConfig {
                backend,
                ..IndexConfig::default()
            }).unwrap();
            for (i, ids) in tags.iter().enumerate() {
                for &id in ids {
                    table.insert_tag(&format!("t{}", i), id, "f").unwrap();
                }
            }
            let ids = match table.query(expr) {
                Ok(result) => Some(result.ids()),
                Err(TagError::TagNotFound(_)) => None,
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            results.push(ids);
        }
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[1], &results[2]);
    }

    #[test]
    fn prop_refcount_equals_bucket_count(
        memberships in prop::collection::vec((0usize..6, 0u64..20), 1..80),
        removals in prop::collection::vec((0usize..6, 0u64..20), 0..40),
    ) {
        let mut table = TagTable::new().unwrap();
        for (tag, id) in &memberships {
            let _ = table.insert_tag(&format!("tag{}", tag), *id, "f");
        }
        for (tag, id) in &removals {
            table.remove_tag(&format!("tag{}", tag), *id).unwrap();
        }

        for id in 0u64..20 {
            let holders = table.tags_of(id).len();
            match table.entry(id) {
                Some(entry) => prop_assert_eq!(entry.refcount as usize, holders),
                None => prop_assert_eq!(holders, 0),
            }
        }
        prop_assert_eq!(table.num_tags(), table.tags().count());
    }
}
