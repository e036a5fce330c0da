#![no_main]

use libfuzzer_sys::fuzz_target;
use capset_core::{Iab, ValueSpace};

fuzz_target!(|text: &str| {
    let space = ValueSpace::new(41);
    if let Ok(iab) = Iab::from_text_in(space, text) {
        let again = Iab::from_text_in(space, &iab.to_string()).expect("printed IAB must parse");
        assert_eq!(again, iab);
    }
});
