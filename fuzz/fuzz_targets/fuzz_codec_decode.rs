#![no_main]
use libfuzzer_sys::fuzz_target;
use tagtable_rs::codec::{decode, encode};
use tagtable_rs::IndexConfig;

// Malformed records must be rejected without panicking; accepted records
// must re-encode to something that decodes again.
fuzz_target!(|data: &[u8]| {
    let config = IndexConfig::default();
    if let Ok(table) = decode(data, &config) {
        let bytes = encode(&table).expect("decoded table must encode");
        let again = decode(&bytes, &config).expect("re-encoded table must decode");
        assert_eq!(again.num_tags(), table.num_tags());
        assert_eq!(again.num_entries(), table.num_entries());
    }
});
