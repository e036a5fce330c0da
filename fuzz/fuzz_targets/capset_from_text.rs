#![no_main]

// Any text that parses must print canonically and reparse to the same set.

use libfuzzer_sys::fuzz_target;
use capset_core::{CapSet, ValueSpace};

fuzz_target!(|text: &str| {
    let space = ValueSpace::new(41);
    if let Ok(set) = CapSet::from_text_in(space, text) {
        let printed = set.to_string();
        let again = CapSet::from_text_in(space, &printed).expect("canonical text must parse");
        assert_eq!(again, set);
        assert_eq!(again.to_string(), printed);
    }
});
