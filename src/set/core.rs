//!
//! The capability [`CapSet`]: three parallel bit-planes (Effective, Permitted,
//! Inheritable) over a [`ValueSpace`], scoped to a user-namespace root.

use crate::error::CapError;
use crate::space::ValueSpace;
use crate::types::{Flag, Value};

/// A set of Effective/Permitted/Inheritable bits for every capability value.
///
/// `flat[word][flag]` holds 32 values of one plane. Bits past
/// `space.max_values()` are never set.
#[derive(Debug, Clone)]
pub struct CapSet {
    pub(crate) space: ValueSpace,
    pub(crate) flat: Vec<[u32; 3]>,
    pub(crate) ns_root: u32,
}

/// Which parts of two sets differ, as reported by [`CapSet::cf`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diff {
    flags: u8,
    ns_root: bool,
}

impl Diff {
    /// True if the given plane differs.
    pub fn has(&self, flag: Flag) -> bool {
        self.flags & (1 << flag.index()) != 0
    }

    /// True if the namespace roots differ.
    pub fn ns_root(&self) -> bool {
        self.ns_root
    }

    pub fn is_empty(&self) -> bool {
        self.flags == 0 && !self.ns_root
    }
}

impl CapSet {
    /// An empty set over the process-wide value space, scoped to the init namespace.
    pub fn new() -> Self {
        Self::with_space(ValueSpace::current())
    }

    /// An empty set over an explicit value space.
    pub fn with_space(space: ValueSpace) -> Self {
        CapSet {
            space,
            flat: vec![[0; 3]; space.words()],
            ns_root: 0,
        }
    }

    pub fn space(&self) -> ValueSpace {
        self.space
    }

    /// The user-namespace root UID this set is interpreted relative to (0 = init).
    pub fn ns_root(&self) -> u32 {
        self.ns_root
    }

    pub fn set_ns_root(&mut self, uid: u32) {
        self.ns_root = uid;
    }

    /// Number of values this set can address.
    pub fn max_bits(&self) -> u32 {
        self.space.max_values()
    }

    /// Raw word `index` of a plane; zero past the allocated words.
    pub fn word(&self, flag: Flag, index: usize) -> u32 {
        self.flat.get(index).map_or(0, |w| w[flag.index()])
    }

    /// Raises or lowers `flag` for each of `values`.
    ///
    /// Values are applied in order. If one is out of range the call fails with
    /// [`CapError::BadValue`] and the values before it remain applied.
    pub fn set_flag(&mut self, flag: Flag, enabled: bool, values: &[Value]) -> Result<(), CapError> {
        for &value in values {
            let (index, mask) = self.space.bit_of(value)?;
            let plane = &mut self.flat[index][flag.index()];
            if enabled {
                *plane |= mask;
            } else {
                *plane &= !mask;
            }
        }
        Ok(())
    }

    /// Reports whether `flag` is raised for `value`.
    pub fn get_flag(&self, flag: Flag, value: Value) -> Result<bool, CapError> {
        let (index, mask) = self.space.bit_of(value)?;
        Ok(self.flat[index][flag.index()] & mask != 0)
    }

    /// Lowers every value of one plane.
    pub fn clear_flag(&mut self, flag: Flag) {
        for w in &mut self.flat {
            w[flag.index()] = 0;
        }
    }

    /// Raises every valid value of one plane.
    pub fn raise_flag(&mut self, flag: Flag) {
        for (i, w) in self.flat.iter_mut().enumerate() {
            w[flag.index()] = self.space.all_mask(i);
        }
    }

    /// Lowers every plane. The namespace root is kept.
    pub fn clear(&mut self) {
        for w in &mut self.flat {
            *w = [0; 3];
        }
    }

    /// Copies the `from` plane over the `to` plane.
    pub fn fill(&mut self, to: Flag, from: Flag) {
        for w in &mut self.flat {
            w[to.index()] = w[from.index()];
        }
    }

    /// Compares two sets plane by plane.
    pub fn cf(&self, other: &CapSet) -> Diff {
        let mut diff = Diff {
            flags: 0,
            ns_root: self.ns_root != other.ns_root,
        };
        let words = self.flat.len().max(other.flat.len());
        for flag in Flag::ALL {
            if (0..words).any(|i| self.word(flag, i) != other.word(flag, i)) {
                diff.flags |= 1 << flag.index();
            }
        }
        diff
    }

    /// Flag pattern of one value as a 3-bit `e|p<<1|i<<2` combination.
    pub(crate) fn pattern(&self, index: usize, mask: u32) -> u8 {
        let w = &self.flat[index];
        let mut p = 0;
        if w[Flag::Effective.index()] & mask != 0 {
            p |= 1;
        }
        if w[Flag::Permitted.index()] & mask != 0 {
            p |= 2;
        }
        if w[Flag::Inheritable.index()] & mask != 0 {
            p |= 4;
        }
        p
    }
}

impl Default for CapSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CapSet {
    fn eq(&self, other: &Self) -> bool {
        self.cf(other).is_empty()
    }
}

impl Eq for CapSet {}
