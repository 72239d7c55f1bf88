#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::collections::{BTreeMap, BTreeSet};
use tagtable_rs::{Backend, IndexConfig, TagTable};

#[derive(Arbitrary, Debug)]
enum Op {
    Insert { tag: u8, file: u8 },
    Remove { tag: u8, file: u8 },
    Rename { from: u8, to: u8 },
    RemoveFile { file: u8 },
    Query { expr: String },
}

#[derive(Arbitrary, Debug)]
struct Input {
    backend: u8,
    ops: Vec<Op>,
}

fn tag(n: u8) -> String {
    format!("t{}", n % 16)
}

// Random mutation sequences must match a plain map model and keep the
// refcount and tag-count invariants.
fuzz_target!(|input: Input| {
    let backend = Backend::ALL[input.backend as usize % Backend::ALL.len()];
    let mut table = match TagTable::with_config(&IndexConfig {
        backend,
        hash_bits: 2,
        ..IndexConfig::default()
    }) {
        Ok(t) => t,
        Err(_) => return,
    };

    let mut model: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();

    for op in input.ops {
        match op {
            Op::Insert { tag: t, file } => {
                if table.insert_tag(&tag(t), file as u64, "f").is_ok() {
                    model.entry(tag(t)).or_default().insert(file as u64);
                }
            }
            Op::Remove { tag: t, file } => {
                if table.remove_tag(&tag(t), file as u64).is_ok() {
                    if let Some(ids) = model.get_mut(&tag(t)) {
                        ids.remove(&(file as u64));
                        if ids.is_empty() {
                            model.remove(&tag(t));
                        }
                    }
                }
            }
            Op::Rename { from, to } => {
                if table.rename_tag(&tag(from), &tag(to)).is_ok() {
                    if let Some(ids) = model.remove(&tag(from)) {
                        model.insert(tag(to), ids);
                    }
                }
            }
            Op::RemoveFile { file } => {
                if table.remove_file(file as u64).is_ok() {
                    model.retain(|_, ids| {
                        ids.remove(&(file as u64));
                        !ids.is_empty()
                    });
                }
            }
            Op::Query { expr } => {
                let _ = table.query(&expr);
            }
        }
    }

    assert_eq!(table.num_tags(), model.len());
    for (name, ids) in &model {
        let element = table.lookup(name).expect("model tag missing from table");
        assert_eq!(element.ids(), ids.iter().copied().collect::<Vec<_>>());
    }

    assert_eq!(table.num_tags(), table.tags().count());
    for file in 0..=u8::MAX as u64 {
        let holders = table.tags_of(file).len();
        let refcount = table.entry(file).map_or(0, |e| e.refcount as usize);
        assert_eq!(refcount, holders);
    }
});
