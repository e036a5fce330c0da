#![no_main]

// Accepted imports survive an export round trip bit for bit.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use capset_core::{CapSet, ExportConfig, ValueSpace};

#[derive(Arbitrary, Debug)]
struct Input {
    bytes: Vec<u8>,
    min_ext_flag_size: u8,
}

fuzz_target!(|input: Input| {
    let space = ValueSpace::new(41);
    if let Ok(set) = CapSet::import_in(space, &input.bytes) {
        let config = ExportConfig {
            min_ext_flag_size: (input.min_ext_flag_size % 16) as usize,
        };
        let ex = set.export_with(&config);
        let back = CapSet::import_in(space, &ex).expect("export must import");
        assert_eq!(back, set);
        assert_eq!(back.ns_root(), set.ns_root());
    }
});
