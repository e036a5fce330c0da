//!
//! The IAB model: the Inheritable, Ambient and Bounding vectors that decide
//! which capabilities survive an exec.
//!
//! The bounding vector is stored inverted (`nb`, "not bound") since the
//! default bounding set contains everything. Ambient bits are only meaningful
//! where Inheritable is also raised, and every mutator here keeps
//! `a ⊆ i`.
//!
//! Text form is a comma (or whitespace) separated list of names, each with
//! optional sigils:
//!
//! | text       | i | a | nb |
//! |------------|---|---|----|
//! | `!name`    | ✓ |   |    |
//! | `name`     | ✓ | ✓ |    |
//! | `^name`    |   |   | ✓  |
//! | `^!name`   | ✓ |   | ✓  |
//! | `^%name`   | ✓ | ✓ | ✓  |

use std::fmt;
use std::str::FromStr;

use crate::backend::CapBackend;
use crate::error::CapError;
use crate::set::CapSet;
use crate::space::ValueSpace;
use crate::types::{Flag, Value, Vector, SETPCAP};

/// Inheritable, Ambient and not-Bounding vectors over a [`ValueSpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iab {
    space: ValueSpace,
    i: Vec<u32>,
    a: Vec<u32>,
    nb: Vec<u32>,
}

/// Which vectors differ between two [`Iab`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IabDiff(u8);

impl IabDiff {
    pub fn has(&self, vec: Vector) -> bool {
        self.0 & (1 << vec as u8) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Iab {
    /// Empty vectors over the process-wide value space: nothing inherited,
    /// nothing ambient, nothing removed from bounding.
    pub fn new() -> Self {
        Self::with_space(ValueSpace::current())
    }

    pub fn with_space(space: ValueSpace) -> Self {
        Iab {
            space,
            i: vec![0; space.words()],
            a: vec![0; space.words()],
            nb: vec![0; space.words()],
        }
    }

    pub fn space(&self) -> ValueSpace {
        self.space
    }

    /// Raw word `index` of a vector. For [`Vector::Bound`] this is the
    /// inverted "not bound" word.
    pub fn word(&self, vec: Vector, index: usize) -> u32 {
        self.vector(vec).get(index).copied().unwrap_or(0)
    }

    fn vector(&self, vec: Vector) -> &[u32] {
        match vec {
            Vector::Inh => &self.i,
            Vector::Amb => &self.a,
            Vector::Bound => &self.nb,
        }
    }

    /// Reports whether `value` is raised in `vec`. For [`Vector::Bound`],
    /// `true` means removed from the bounding set.
    pub fn get_vector(&self, vec: Vector, value: Value) -> Result<bool, CapError> {
        let (index, mask) = self.space.bit_of(value)?;
        Ok(self.vector(vec)[index] & mask != 0)
    }

    /// Raises or lowers `values` in `vec`.
    ///
    /// Raising Ambient also raises Inheritable; lowering Inheritable also
    /// lowers Ambient. As with [`CapSet::set_flag`], values before an
    /// out-of-range one stay applied.
    pub fn set_vector(&mut self, vec: Vector, enabled: bool, values: &[Value]) -> Result<(), CapError> {
        for &value in values {
            let (index, mask) = self.space.bit_of(value)?;
            match (vec, enabled) {
                (Vector::Inh, true) => self.i[index] |= mask,
                (Vector::Inh, false) => {
                    self.i[index] &= !mask;
                    self.a[index] &= !mask;
                }
                (Vector::Amb, true) => {
                    self.a[index] |= mask;
                    self.i[index] |= mask;
                }
                (Vector::Amb, false) => self.a[index] &= !mask,
                (Vector::Bound, true) => self.nb[index] |= mask,
                (Vector::Bound, false) => self.nb[index] &= !mask,
            }
        }
        Ok(())
    }

    /// Copies the `flag` plane of `set` into `vec`.
    ///
    /// For [`Vector::Bound`] the plane lists the values to keep, so `nb`
    /// receives its complement. The set must share this IAB's value space.
    pub fn fill(&mut self, vec: Vector, set: &CapSet, flag: Flag) -> Result<(), CapError> {
        if set.space() != self.space {
            return Err(CapError::BadValue(set.space().max_values()));
        }
        for index in 0..self.space.words() {
            let m = set.word(flag, index);
            match vec {
                Vector::Inh => {
                    self.i[index] = m;
                    self.a[index] &= m;
                }
                Vector::Amb => {
                    self.a[index] = m;
                    self.i[index] |= m;
                }
                Vector::Bound => self.nb[index] = !m & self.space.all_mask(index),
            }
        }
        Ok(())
    }

    pub fn cf(&self, other: &Iab) -> IabDiff {
        let mut diff = 0;
        let words = self.space.words().max(other.space.words());
        for vec in [Vector::Inh, Vector::Amb, Vector::Bound] {
            if (0..words).any(|i| self.word(vec, i) != other.word(vec, i)) {
                diff |= 1 << vec as u8;
            }
        }
        IabDiff(diff)
    }

    /// Reads the calling thread's IAB through `backend`.
    pub fn from_proc(backend: &dyn CapBackend) -> Result<Iab, CapError> {
        let caps = backend.get_proc()?;
        let mut iab = Iab::with_space(caps.space());
        iab.fill(Vector::Inh, &caps, Flag::Inheritable)?;
        for v in caps.space().values() {
            let (index, mask) = iab.space.bit_of(v)?;
            if backend.get_ambient(v)? {
                iab.a[index] |= mask;
            }
            if !backend.get_bound(v)? {
                iab.nb[index] |= mask;
            }
        }
        Ok(iab)
    }

    /// Applies this IAB to the calling thread through `backend`.
    ///
    /// The inheritable plane is replaced first. If that raises a value the
    /// thread holds in neither Inheritable nor Permitted, or a value must
    /// leave the bounding set, `CAP_SETPCAP` is raised in Effective for the
    /// duration of the call. Ambient is then reset and rebuilt, and the
    /// bounding drops happen last. Whatever happens after the first write,
    /// the thread ends up with its original Effective and Permitted planes
    /// and the new Inheritable plane.
    pub fn apply(&self, backend: &dyn CapBackend) -> Result<(), CapError> {
        let mut temp = backend.get_proc()?;
        if temp.space() != self.space {
            return Err(CapError::BadValue(temp.space().max_values()));
        }

        let inh = Flag::Inheritable.index();
        let mut raising = false;
        for (index, planes) in temp.flat.iter_mut().enumerate() {
            let old_ip = planes[inh] | planes[Flag::Permitted.index()];
            raising |= self.i[index] & !old_ip != 0;
            planes[inh] = self.i[index];
        }

        let mut check_bound = false;
        for v in self.space.values().rev() {
            if self.get_vector(Vector::Bound, v)? && backend.get_bound(v)? {
                check_bound = true;
                raising = true;
                break;
            }
        }

        let mut working = temp.clone();
        if raising {
            working.set_flag(Flag::Effective, true, &[SETPCAP])?;
        }
        backend.set_proc(&working)?;

        let applied = self.apply_vectors(backend, check_bound);
        let restored = backend.set_proc(&temp);
        applied.and(restored)?;
        tracing::debug!(iab = %self, raised_setpcap = raising, "applied IAB to current thread");
        Ok(())
    }

    fn apply_vectors(&self, backend: &dyn CapBackend, check_bound: bool) -> Result<(), CapError> {
        backend.reset_ambient()?;
        for v in self.space.values().rev() {
            if self.get_vector(Vector::Amb, v)? {
                backend.set_ambient(v, true)?;
            }
            if check_bound && self.get_vector(Vector::Bound, v)? {
                backend.drop_bound(v)?;
            }
        }
        Ok(())
    }

    /// Parses IAB text over the process-wide value space.
    pub fn from_text(text: &str) -> Result<Iab, CapError> {
        Self::from_text_in(ValueSpace::current(), text)
    }

    pub fn from_text_in(space: ValueSpace, text: &str) -> Result<Iab, CapError> {
        let mut iab = Iab::with_space(space);
        for word in text.split_ascii_whitespace() {
            for token in word.split(',') {
                iab.apply_token(token)?;
            }
        }
        Ok(iab)
    }

    fn apply_token(&mut self, token: &str) -> Result<(), CapError> {
        let name = token.trim_start_matches(|c: char| matches!(c, '!' | '^' | '%'));
        let sigils = &token[..token.len() - name.len()];
        let nb = sigils.contains('^');
        let amb = sigils.is_empty() || sigils.contains('%');
        let inh = amb || sigils.contains('!');

        let value = Value::from_name(name)?;
        let (index, mask) = self
            .space
            .bit_of(value)
            .map_err(|_| CapError::bad_text(format!("{name:?} is outside the value space")))?;
        if inh {
            self.i[index] |= mask;
        }
        if amb {
            self.a[index] |= mask;
        }
        if nb {
            self.nb[index] |= mask;
        }
        Ok(())
    }
}

impl Default for Iab {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Iab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in self.space.values() {
            let index = v.0 as usize / 32;
            let mask = 1u32 << (v.0 % 32);
            let i = self.i[index] & mask != 0;
            let a = self.a[index] & mask != 0;
            let nb = self.nb[index] & mask != 0;
            let sigils = match (nb, a, i) {
                (false, false, false) => continue,
                (false, false, true) => "!",
                (false, true, _) => "",
                (true, true, _) => "^%",
                (true, false, true) => "^!",
                (true, false, false) => "^",
            };
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{sigils}{v}")?;
        }
        Ok(())
    }
}

impl FromStr for Iab {
    type Err = CapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Iab::from_text(s)
    }
}

impl serde::Serialize for Iab {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Iab {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Iab::from_text(&text).map_err(serde::de::Error::custom)
    }
}
