//!
//! Bit addressing for the capability value universe.
//!
//! Values are packed 32 to a word. The size of the universe (`max_values`) is
//! a runtime property: a newer kernel may know more capabilities than this
//! crate has names for, so nothing outside this module assumes a word count.
//! Every bulk operation masks its words with [`ValueSpace::all_mask`].

use crate::error::CapError;
use crate::types::{Value, NAMED_COUNT};
use std::sync::RwLock;

/// Number of value bits held by one word.
pub const WORD_BITS: u32 = 32;

const CAP_LAST_CAP_PATH: &str = "/proc/sys/kernel/cap_last_cap";

/// The range of valid capability values and the number of words used to hold them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueSpace {
    max_values: u32,
    words: usize,
}

static CURRENT: RwLock<ValueSpace> = RwLock::new(ValueSpace::new(NAMED_COUNT));

impl ValueSpace {
    /// A space of `max_values` values using the minimum number of words.
    pub const fn new(max_values: u32) -> Self {
        ValueSpace {
            max_values,
            words: max_values.div_ceil(WORD_BITS) as usize,
        }
    }

    /// A space that allocates `words` words even if fewer would do.
    ///
    /// Kernels report their word count independently of the number of values
    /// they define; the extra words are carried but always masked to zero.
    pub fn with_words(max_values: u32, words: usize) -> Result<Self, CapError> {
        let needed = max_values.div_ceil(WORD_BITS) as usize;
        if words < needed {
            return Err(CapError::BadValue(max_values));
        }
        Ok(ValueSpace { max_values, words })
    }

    /// The process-wide value space used by constructors that are not given one.
    pub fn current() -> ValueSpace {
        *CURRENT.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the process-wide value space. Sets created earlier keep the
    /// space they were created with.
    pub fn set_current(space: ValueSpace) {
        tracing::debug!(
            max_values = space.max_values,
            words = space.words,
            "updating process value space"
        );
        *CURRENT.write().unwrap_or_else(|e| e.into_inner()) = space;
    }

    /// Sizes a value space from the running kernel's `cap_last_cap`.
    pub fn probe() -> Result<ValueSpace, CapError> {
        let raw = std::fs::read_to_string(CAP_LAST_CAP_PATH)
            .map_err(|e| CapError::Backend(format!("reading {CAP_LAST_CAP_PATH}: {e}")))?;
        let last: u32 = raw
            .trim()
            .parse()
            .map_err(|e| CapError::Backend(format!("parsing {CAP_LAST_CAP_PATH}: {e}")))?;
        let space = ValueSpace::new(last + 1);
        tracing::debug!(max_values = space.max_values, "probed kernel value space");
        Ok(space)
    }

    #[inline]
    pub fn max_values(&self) -> u32 {
        self.max_values
    }

    #[inline]
    pub fn words(&self) -> usize {
        self.words
    }

    /// Returns `(word index, bit mask)` addressing `value`.
    #[inline]
    pub fn bit_of(&self, value: Value) -> Result<(usize, u32), CapError> {
        if value.0 >= self.max_values {
            return Err(CapError::BadValue(value.0));
        }
        Ok(((value.0 / WORD_BITS) as usize, 1u32 << (value.0 % WORD_BITS)))
    }

    /// Mask of the valid bits in word `index`.
    ///
    /// All ones below the last valid word, only the low `max_values % 32` bits
    /// in the last valid word (all ones if the space divides evenly), and zero
    /// past it.
    #[inline]
    pub fn all_mask(&self, index: usize) -> u32 {
        if self.max_values == 0 || index >= self.words {
            return 0;
        }
        let last = ((self.max_values - 1) / WORD_BITS) as usize;
        if index < last {
            u32::MAX
        } else if index == last {
            match self.max_values % WORD_BITS {
                0 => u32::MAX,
                rem => (1u32 << rem) - 1,
            }
        } else {
            0
        }
    }

    /// Iterates over every valid value, lowest first.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = Value> {
        (0..self.max_values).map(Value)
    }
}

impl Default for ValueSpace {
    fn default() -> Self {
        ValueSpace::current()
    }
}
