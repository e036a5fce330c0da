#![cfg(test)]

use std::sync::Arc;

use capset_core::backend::{CapBackend, MemoryBackend};
use capset_core::types::{CHOWN, SETFCAP, SETUID};
use capset_core::{CapError, CapSet, Flag, Iab, LaunchError, Launcher, Value, ValueSpace, Vector};

fn space() -> ValueSpace {
    ValueSpace::new(41)
}

// --- Addressing ---

#[test]
fn test_addressing_law() {
    for (max, words) in [(41, 2), (64, 2), (65, 3), (35, 3)] {
        let s = ValueSpace::with_words(max, words).unwrap();
        for v in 0..max {
            let (index, mask) = s.bit_of(Value(v)).unwrap();
            assert_eq!(index, (v / 32) as usize);
            assert_eq!(mask, 1 << (v % 32));
            assert_ne!(s.all_mask(index) & mask, 0);
        }
        assert_eq!(s.bit_of(Value(max)), Err(CapError::BadValue(max)));
    }
}

#[test]
fn test_value_names() {
    assert_eq!(CHOWN.to_string(), "cap_chown");
    assert_eq!(Value(200).to_string(), "200");
    assert_eq!(Value::from_name("CAP_SETFCAP").unwrap(), SETFCAP);
}

// --- Text codec ---

#[test]
fn test_text_goldens() {
    let cases = [
        ("= cap_chown+iep cap_chown-i", "cap_chown=ep"),
        ("= cap_setfcap,cap_chown+iep cap_chown-i", "cap_setfcap=eip cap_chown+ep"),
        ("=i =p", "=p"),
        ("all+pie", "=eip"),
        ("all=p+ie-e", "=ip"),
        ("=", "="),
    ];
    for (input, want) in cases {
        let c = CapSet::from_text_in(space(), input).unwrap();
        assert_eq!(c.to_string(), want, "parsing {input:?}");
        assert_eq!(CapSet::from_text_in(space(), want).unwrap(), c);
    }
}

#[test]
fn test_text_rejects() {
    for bad in ["", "cap_chown", "cap_nope=e", "cap_chown+", "cap_chown=x", "cap_chown,=e"] {
        assert!(
            matches!(CapSet::from_text_in(space(), bad), Err(CapError::BadText(_))),
            "{bad:?} should be rejected"
        );
    }
}

// --- Binary codec ---

#[test]
fn test_export_import_preserves_ns_root() {
    let mut c = CapSet::from_text_in(space(), "cap_setuid=ep cap_setfcap+i").unwrap();
    c.set_ns_root(1000);
    let ex = c.export();
    let im = CapSet::import_in(space(), &ex).unwrap();
    assert_eq!(im.ns_root(), 1000);
    assert_eq!(im.to_string(), "1000= cap_setfcap=i cap_setuid+ep");
    assert!(c.cf(&im).is_empty());
}

// --- IAB ---

#[test]
fn test_iab_vector_coupling() {
    let mut iab = Iab::with_space(space());
    iab.set_vector(Vector::Amb, true, &[SETUID]).unwrap();
    assert!(iab.get_vector(Vector::Inh, SETUID).unwrap());

    iab.set_vector(Vector::Inh, false, &[SETUID]).unwrap();
    assert!(!iab.get_vector(Vector::Amb, SETUID).unwrap());
}

#[test]
fn test_iab_text() {
    let iab = Iab::from_text_in(space(), "!cap_chown,^cap_setuid,cap_setfcap").unwrap();
    assert!(iab.get_vector(Vector::Inh, CHOWN).unwrap());
    assert!(!iab.get_vector(Vector::Amb, CHOWN).unwrap());
    assert!(iab.get_vector(Vector::Bound, SETUID).unwrap());
    assert!(iab.get_vector(Vector::Amb, SETFCAP).unwrap());
    assert_eq!(Iab::from_text_in(space(), &iab.to_string()).unwrap(), iab);
    assert!(Iab::from_text_in(space(), "cap_bogus").is_err());
}

// --- Launcher ---

#[test]
fn test_launcher_isolates_memory_backend() {
    let initial = CapSet::from_text_in(space(), "cap_chown,cap_setuid,cap_setpcap=eip").unwrap();
    let backend = Arc::new(MemoryBackend::new(initial));
    let inner = backend.clone();
    let launcher = Launcher::new(move |drop: Flag| -> Result<bool, CapError> {
        inner.drop_bound(CHOWN)?;
        let mut caps = inner.get_proc()?;
        caps.clear_flag(drop);
        inner.set_proc(&caps)?;
        inner.set_keep_caps(true)?;
        inner.keep_caps()
    })
    .with_backend(backend.clone());

    assert!(launcher.launch(Flag::Effective).unwrap());
    assert!(backend.get_proc().unwrap().get_flag(Flag::Effective, CHOWN).unwrap());
    assert!(backend.get_bound(CHOWN).unwrap());
    assert!(!backend.keep_caps().unwrap());
}

#[test]
fn test_launcher_reports_function_error() {
    let backend = Arc::new(MemoryBackend::new(CapSet::with_space(space())));
    let launcher = Launcher::new(|v: u32| CapSet::with_space(space()).get_flag(Flag::Effective, Value(v)))
        .with_backend(backend);
    assert!(!launcher.launch(3).unwrap());
    match launcher.launch(99) {
        Err(e) => assert_eq!(e.into_func(), Some(CapError::BadValue(99))),
        Ok(v) => panic!("unexpected {v}"),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_launcher_keep_caps_never_leaks() {
    use capset_core::backend::LinuxBackend;

    let backend = Arc::new(LinuxBackend::new());
    let original = backend.keep_caps().unwrap();
    let inner = backend.clone();
    let launcher = Launcher::new(move |keep: bool| -> Result<bool, CapError> {
        inner.set_keep_caps(keep)?;
        inner.keep_caps()
    })
    .with_backend(backend.clone());

    // The caller flips its own flag after every trial, so each launch
    // changes the launched thread's inherited value.
    for trial in 0..100 {
        let current = backend.keep_caps().unwrap();
        match launcher.launch(!current) {
            Ok(seen) => assert_eq!(seen, !current, "trial {trial}"),
            Err(LaunchError::Leaked) => panic!("trial {trial}: state leaked into the caller"),
            Err(e) => panic!("trial {trial}: {e}"),
        }
        assert_eq!(backend.keep_caps().unwrap(), current, "trial {trial}");
        backend.set_keep_caps(!current).unwrap();
    }
    backend.set_keep_caps(original).unwrap();
}
