//!
//! Text form of a [`CapSet`].
//!
//! A text is a whitespace separated list of clauses, optionally preceded by a
//! `<uid>=` namespace prefix:
//!
//! ```text
//! [uid=] clause { clause }
//! clause   = [value {"," value}] op letters { op letters }
//! value    = name | decimal | "all"
//! op       = "=" | "+" | "-"
//! letters  = { "e" | "i" | "p" }
//! ```
//!
//! `=` lowers every flag of the listed values before raising `letters`, `+`
//! raises, `-` lowers. An empty value list before `=` means `all`.
//!
//! Formatting is canonical: the most common flag pattern becomes the `=`
//! base clause and every other pattern is printed as a delta from it, so
//! parsing the output always reproduces the same bits.

use std::fmt;
use std::str::FromStr;

use super::core::CapSet;
use crate::error::CapError;
use crate::space::ValueSpace;
use crate::types::{Flag, Value};

/// Letter groups indexed by `e|p<<1|i<<2`.
const COMBOS: [&str; 8] = ["", "e", "p", "ep", "i", "ei", "ip", "eip"];

impl CapSet {
    /// Parses capability text over the process-wide value space.
    pub fn from_text(text: &str) -> Result<CapSet, CapError> {
        Self::from_text_in(ValueSpace::current(), text)
    }

    /// Parses capability text over `space`. Nothing is returned on error.
    pub fn from_text_in(space: ValueSpace, text: &str) -> Result<CapSet, CapError> {
        let mut tokens = text.split_ascii_whitespace().peekable();
        if tokens.peek().is_none() {
            return Err(CapError::bad_text("empty capability text"));
        }

        let mut set = CapSet::with_space(space);
        if let Some(uid) = tokens.peek().and_then(|t| ns_prefix(t)) {
            set.ns_root = uid;
            tokens.next();
            if tokens.peek().is_none() {
                return Err(CapError::bad_text("namespace prefix without clauses"));
            }
        }

        for token in tokens {
            if ns_prefix(token).is_some() {
                return Err(CapError::bad_text(format!(
                    "namespace prefix {token:?} must lead the text"
                )));
            }
            apply_clause(&mut set, token)?;
        }
        Ok(set)
    }
}

/// `<digits>=` with nothing after the `=` is reserved for the namespace prefix.
fn ns_prefix(token: &str) -> Option<u32> {
    let digits = token.strip_suffix('=')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn apply_clause(set: &mut CapSet, clause: &str) -> Result<(), CapError> {
    let split = clause
        .find(|c: char| matches!(c, '=' | '+' | '-'))
        .ok_or_else(|| CapError::bad_text(format!("clause {clause:?} has no operator")))?;
    let (list, ops) = clause.split_at(split);

    let selected = if list.is_empty() {
        if !ops.starts_with('=') {
            return Err(CapError::bad_text(format!(
                "clause {clause:?} needs a value list"
            )));
        }
        all_words(&set.space)
    } else {
        select(&set.space, list)?
    };

    let mut chars = ops.chars().peekable();
    while let Some(op) = chars.next() {
        let mut letters = [false; 3];
        let mut any = false;
        while let Some(&c) = chars.peek() {
            let flag = match c {
                'e' => Flag::Effective,
                'p' => Flag::Permitted,
                'i' => Flag::Inheritable,
                '=' | '+' | '-' => break,
                _ => {
                    return Err(CapError::bad_text(format!(
                        "unexpected {c:?} in clause {clause:?}"
                    )))
                }
            };
            letters[flag.index()] = true;
            any = true;
            chars.next();
        }
        if op != '=' && !any {
            return Err(CapError::bad_text(format!(
                "operator {op:?} without flags in clause {clause:?}"
            )));
        }

        for (i, sel) in selected.iter().enumerate() {
            let planes = &mut set.flat[i];
            for flag in Flag::ALL {
                let plane = &mut planes[flag.index()];
                match op {
                    '=' => {
                        *plane &= !sel;
                        if letters[flag.index()] {
                            *plane |= sel;
                        }
                    }
                    '+' if letters[flag.index()] => *plane |= sel,
                    '-' if letters[flag.index()] => *plane &= !sel,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn all_words(space: &ValueSpace) -> Vec<u32> {
    (0..space.words()).map(|i| space.all_mask(i)).collect()
}

/// Per-word masks of the values named by a comma separated list.
fn select(space: &ValueSpace, list: &str) -> Result<Vec<u32>, CapError> {
    let mut words = vec![0u32; space.words()];
    let mut all = false;
    for item in list.split(',') {
        if item.eq_ignore_ascii_case("all") {
            all = true;
            continue;
        }
        let value = Value::from_name(item)?;
        let (index, mask) = space
            .bit_of(value)
            .map_err(|_| CapError::bad_text(format!("{item:?} is outside the value space")))?;
        words[index] |= mask;
    }
    if all {
        return Ok(all_words(space));
    }
    Ok(words)
}

impl fmt::Display for CapSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bins = [0usize; 8];
        let mut patterns = Vec::with_capacity(self.space.max_values() as usize);
        for v in self.space.values() {
            let (index, mask) = (v.0 as usize / 32, 1u32 << (v.0 % 32));
            let p = self.pattern(index, mask);
            bins[p as usize] += 1;
            patterns.push(p);
        }

        // Most common pattern; ties go to the smaller combination.
        let mut base = 7;
        for t in (0..7).rev() {
            if bins[t] >= bins[base] {
                base = t;
            }
        }

        let mut clauses = vec![format!("={}", COMBOS[base])];
        for combo in (0..8).rev() {
            if combo == base || bins[combo] == 0 {
                continue;
            }
            let mut clause = patterns
                .iter()
                .enumerate()
                .filter(|(_, p)| **p as usize == combo)
                .map(|(v, _)| Value(v as u32).to_string())
                .collect::<Vec<_>>()
                .join(",");
            let raise = combo & !base;
            if raise != 0 {
                // "= name+x" reads better as "name=x".
                let op = if clauses.len() == 1 && clauses[0] == "=" {
                    clauses.clear();
                    '='
                } else {
                    '+'
                };
                clause.push(op);
                clause.push_str(COMBOS[raise]);
            }
            let lower = base & !combo;
            if lower != 0 {
                clause.push('-');
                clause.push_str(COMBOS[lower]);
            }
            clauses.push(clause);
        }

        if self.ns_root != 0 {
            write!(f, "{}= ", self.ns_root)?;
        }
        f.write_str(&clauses.join(" "))
    }
}

impl FromStr for CapSet {
    type Err = CapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapSet::from_text(s)
    }
}

impl serde::Serialize for CapSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for CapSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        CapSet::from_text(&text).map_err(serde::de::Error::custom)
    }
}
