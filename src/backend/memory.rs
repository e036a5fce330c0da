//! In-memory [`CapBackend`] whose state lives in a `thread_local!`.
//!
//! Each thread starts from the backend's initial set with a full bounding
//! set, no ambient capabilities and no securebits, so tests can observe
//! thread isolation without kernel privileges.
//!
//! The kernel rules modelled are the ones the IAB and launcher code must
//! respect: permitted never grows, effective stays within permitted,
//! inheritable may only grow past `I | P` and the bounding set may only
//! shrink while `CAP_SETPCAP` is effective, and ambient needs the value in
//! both permitted and inheritable.
//!
//! Models are keyed by backend and never removed, so every backend leaves
//! one entry behind on each thread that touched it. Fine for tests; do not
//! create backends in a long-running loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::CapBackend;
use crate::error::CapError;
use crate::set::CapSet;
use crate::types::{Flag, Value, SETPCAP};

/// Securebit mirrored by [`CapBackend::keep_caps`].
pub const SECBIT_KEEP_CAPS: u32 = 1 << 4;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
struct Model {
    caps: CapSet,
    bound: CapSet,
    ambient: CapSet,
    secbits: u32,
}

thread_local! {
    static MODELS: RefCell<HashMap<u64, Model>> = RefCell::new(HashMap::new());
}

/// A fake kernel, one model per (backend, thread).
#[derive(Debug)]
pub struct MemoryBackend {
    id: u64,
    initial: CapSet,
}

impl MemoryBackend {
    /// Every thread that touches this backend starts from `initial`.
    pub fn new(initial: CapSet) -> Self {
        MemoryBackend {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            initial,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Model) -> Result<R, CapError>) -> Result<R, CapError> {
        MODELS.with(|models| {
            let mut models = models.borrow_mut();
            let model = models.entry(self.id).or_insert_with(|| {
                let mut bound = CapSet::with_space(self.initial.space());
                bound.raise_flag(Flag::Permitted);
                Model {
                    caps: self.initial.clone(),
                    bound,
                    ambient: CapSet::with_space(self.initial.space()),
                    secbits: 0,
                }
            });
            f(model)
        })
    }
}

fn subset(inner: &CapSet, inner_flag: Flag, outer: &CapSet, outer_flag: Flag) -> bool {
    (0..inner.space().words()).all(|i| {
        let w = inner.word(inner_flag, i);
        w & outer.word(outer_flag, i) == w
    })
}

/// New inheritable bits all come from the old inheritable or permitted planes.
fn inheritable_capped(new: &CapSet, old: &CapSet) -> bool {
    (0..new.space().words()).all(|i| {
        let w = new.word(Flag::Inheritable, i);
        w & (old.word(Flag::Inheritable, i) | old.word(Flag::Permitted, i)) == w
    })
}

impl CapBackend for MemoryBackend {
    fn get_proc(&self) -> Result<CapSet, CapError> {
        self.with(|m| Ok(m.caps.clone()))
    }

    fn set_proc(&self, set: &CapSet) -> Result<(), CapError> {
        self.with(|m| {
            if !subset(set, Flag::Permitted, &m.caps, Flag::Permitted) {
                return Err(CapError::Backend("capset: cannot raise permitted".into()));
            }
            if !subset(set, Flag::Effective, set, Flag::Permitted) {
                return Err(CapError::Backend("capset: effective exceeds permitted".into()));
            }
            if !m.caps.get_flag(Flag::Effective, SETPCAP)? && !inheritable_capped(set, &m.caps) {
                return Err(CapError::Backend(
                    "capset: raising inheritable needs CAP_SETPCAP".into(),
                ));
            }
            m.caps = set.clone();
            Ok(())
        })
    }

    fn get_pid(&self, pid: i32) -> Result<CapSet, CapError> {
        if pid == 0 {
            return self.get_proc();
        }
        Err(CapError::Backend(format!("no such process {pid}")))
    }

    fn prctl(&self, request: i32, _args: [u64; 4]) -> Result<i32, CapError> {
        Err(CapError::Backend(format!("prctl request {request} is not modelled")))
    }

    fn get_bound(&self, value: Value) -> Result<bool, CapError> {
        self.with(|m| m.bound.get_flag(Flag::Permitted, value))
    }

    fn drop_bound(&self, value: Value) -> Result<(), CapError> {
        self.with(|m| {
            if !m.caps.get_flag(Flag::Effective, SETPCAP)? {
                return Err(CapError::Backend(format!(
                    "cannot drop {value} from bounding: CAP_SETPCAP not effective"
                )));
            }
            m.bound.set_flag(Flag::Permitted, false, &[value])
        })
    }

    fn get_ambient(&self, value: Value) -> Result<bool, CapError> {
        self.with(|m| m.ambient.get_flag(Flag::Permitted, value))
    }

    fn set_ambient(&self, value: Value, raised: bool) -> Result<(), CapError> {
        self.with(|m| {
            if raised
                && !(m.caps.get_flag(Flag::Permitted, value)? && m.caps.get_flag(Flag::Inheritable, value)?)
            {
                return Err(CapError::Backend(format!(
                    "cannot raise ambient {value}: not permitted and inheritable"
                )));
            }
            m.ambient.set_flag(Flag::Permitted, raised, &[value])
        })
    }

    fn reset_ambient(&self) -> Result<(), CapError> {
        self.with(|m| {
            m.ambient.clear();
            Ok(())
        })
    }

    fn get_secbits(&self) -> Result<u32, CapError> {
        self.with(|m| Ok(m.secbits))
    }

    fn set_secbits(&self, bits: u32) -> Result<(), CapError> {
        self.with(|m| {
            m.secbits = bits;
            Ok(())
        })
    }

    fn keep_caps(&self) -> Result<bool, CapError> {
        self.with(|m| Ok(m.secbits & SECBIT_KEEP_CAPS != 0))
    }

    fn set_keep_caps(&self, keep: bool) -> Result<(), CapError> {
        self.with(|m| {
            if keep {
                m.secbits |= SECBIT_KEEP_CAPS;
            } else {
                m.secbits &= !SECBIT_KEEP_CAPS;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iab::Iab;
    use crate::space::ValueSpace;
    use crate::types::{Vector, CHOWN, KILL, NET_RAW, SETUID};

    fn initial() -> CapSet {
        CapSet::from_text_in(
            ValueSpace::new(41),
            "cap_chown,cap_setuid,cap_net_raw=eip cap_setpcap=p cap_kill=i",
        )
        .unwrap()
    }

    #[test]
    fn test_state_is_per_thread() {
        let backend = MemoryBackend::new(initial());
        backend.set_keep_caps(true).unwrap();
        std::thread::scope(|s| {
            s.spawn(|| assert!(!backend.keep_caps().unwrap()));
        });
        assert!(backend.keep_caps().unwrap());
    }

    #[test]
    fn test_cannot_raise_permitted() {
        let backend = MemoryBackend::new(initial());
        let mut caps = backend.get_proc().unwrap();
        caps.set_flag(Flag::Permitted, true, &[Value(30)]).unwrap();
        assert!(backend.set_proc(&caps).is_err());

        let mut caps = backend.get_proc().unwrap();
        caps.set_flag(Flag::Effective, false, &[CHOWN]).unwrap();
        backend.set_proc(&caps).unwrap();
        assert!(!backend.get_proc().unwrap().get_flag(Flag::Effective, CHOWN).unwrap());
    }

    #[test]
    fn test_iab_apply_and_read_back() {
        let backend = MemoryBackend::new(initial());
        let iab = Iab::from_text_in(ValueSpace::new(41), "cap_chown,!cap_setuid,^cap_net_raw").unwrap();
        iab.apply(&backend).unwrap();

        let read = Iab::from_proc(&backend).unwrap();
        assert_eq!(read, iab);
        assert!(read.get_vector(Vector::Amb, CHOWN).unwrap());
        assert!(!read.get_vector(Vector::Amb, SETUID).unwrap());
        assert!(!backend.get_bound(NET_RAW).unwrap());

        // CAP_SETPCAP was only raised for the duration of the call.
        let caps = backend.get_proc().unwrap();
        assert!(!caps.get_flag(Flag::Effective, SETPCAP).unwrap());
        assert!(caps.get_flag(Flag::Permitted, SETPCAP).unwrap());
    }

    #[test]
    fn test_drop_bound_needs_effective_setpcap() {
        let backend = MemoryBackend::new(initial());
        assert!(backend.drop_bound(NET_RAW).is_err());
        assert!(backend.get_bound(NET_RAW).unwrap());

        let mut caps = backend.get_proc().unwrap();
        caps.set_flag(Flag::Effective, true, &[SETPCAP]).unwrap();
        backend.set_proc(&caps).unwrap();
        backend.drop_bound(NET_RAW).unwrap();
        assert!(!backend.get_bound(NET_RAW).unwrap());
    }

    #[test]
    fn test_raising_inheritable_needs_effective_setpcap() {
        let backend = MemoryBackend::new(initial());
        let mut caps = backend.get_proc().unwrap();
        caps.set_flag(Flag::Inheritable, true, &[Value(30)]).unwrap();
        assert!(backend.set_proc(&caps).is_err());

        // Values already permitted may join inheritable freely.
        let mut caps = backend.get_proc().unwrap();
        caps.set_flag(Flag::Inheritable, true, &[SETPCAP]).unwrap();
        backend.set_proc(&caps).unwrap();
    }

    #[test]
    fn test_iab_apply_failure_restores_effective() {
        let backend = MemoryBackend::new(initial());
        // cap_kill is inheritable but not permitted, so it cannot go ambient.
        let iab = Iab::from_text_in(ValueSpace::new(41), "cap_kill,^cap_net_raw").unwrap();
        assert!(iab.apply(&backend).is_err());

        let caps = backend.get_proc().unwrap();
        assert!(!caps.get_flag(Flag::Effective, SETPCAP).unwrap());
        assert!(caps.get_flag(Flag::Inheritable, KILL).unwrap());
        assert!(!caps.get_flag(Flag::Inheritable, CHOWN).unwrap());
        assert!(!backend.get_ambient(KILL).unwrap());
    }

    #[test]
    fn test_iab_apply_without_setpcap_cannot_drop_bound() {
        let initial = CapSet::from_text_in(ValueSpace::new(41), "cap_chown=eip").unwrap();
        let backend = MemoryBackend::new(initial);
        let iab = Iab::from_text_in(ValueSpace::new(41), "^cap_net_raw").unwrap();
        assert!(iab.apply(&backend).is_err());
        assert!(backend.get_bound(NET_RAW).unwrap());
        assert_eq!(backend.get_proc().unwrap().to_string(), "cap_chown=eip");
    }
}
