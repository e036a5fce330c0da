//!
//! Binary export/import of a [`CapSet`].
//!
//! Layout:
//!
//! ```text
//! +---------+----------------+----------------------------------------+
//! | version | ns_root (LE32) | size × (effective, permitted, inherit) |
//! | 1 byte  | 4 bytes        | 3 bytes per group of 8 values          |
//! +---------+----------------+----------------------------------------+
//! ```
//!
//! `size` is implied by the payload length. Export writes just enough groups
//! to cover the highest raised value, but never fewer than
//! [`ExportConfig::min_ext_flag_size`].

use super::core::CapSet;
use crate::error::CapError;
use crate::space::ValueSpace;
use crate::types::Flag;

/// Leading byte of every export.
pub const EXPORT_VERSION: u8 = 0x51;

/// Bytes before the flag payload: the version byte plus the namespace root.
pub const HEADER_LEN: usize = 5;

/// Default lower bound on exported groups; covers 64 values.
pub const MIN_EXT_FLAG_SIZE: usize = 8;

/// Tuning for [`CapSet::export_with`]. Only the size of the export changes,
/// never what it decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Minimum number of 8-value groups per plane.
    pub min_ext_flag_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            min_ext_flag_size: MIN_EXT_FLAG_SIZE,
        }
    }
}

/// An exported capability set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Exported(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl Exported {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Number of 8-value groups carried per plane. Zero for a blob shorter
    /// than the header.
    pub fn size(&self) -> usize {
        self.0.len().saturating_sub(HEADER_LEN) / 3
    }
}

impl AsRef<[u8]> for Exported {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for Exported {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl CapSet {
    /// Exports with the default [`ExportConfig`].
    pub fn export(&self) -> Exported {
        self.export_with(&ExportConfig::default())
    }

    pub fn export_with(&self, config: &ExportConfig) -> Exported {
        let mut needed = 0;
        for (i, w) in self.flat.iter().enumerate() {
            let union = w[0] | w[1] | w[2];
            if union != 0 {
                needed = 4 * i + (32 - union.leading_zeros() as usize).div_ceil(8);
            }
        }
        let size = needed.max(config.min_ext_flag_size);
        tracing::trace!(needed, size, "exporting capability set");

        let mut out = Vec::with_capacity(HEADER_LEN + 3 * size);
        out.push(EXPORT_VERSION);
        out.extend_from_slice(&self.ns_root.to_le_bytes());
        for group in 0..size {
            let shift = 8 * (group % 4);
            let word = group / 4;
            for flag in [Flag::Effective, Flag::Permitted, Flag::Inheritable] {
                out.push((self.word(flag, word) >> shift) as u8);
            }
        }
        Exported(out)
    }

    /// Imports over the process-wide value space.
    pub fn import(data: &[u8]) -> Result<CapSet, CapError> {
        Self::import_in(ValueSpace::current(), data)
    }

    /// Imports over `space`. Groups beyond the space are accepted only if
    /// they carry no raised bits.
    pub fn import_in(space: ValueSpace, data: &[u8]) -> Result<CapSet, CapError> {
        if data.len() < HEADER_LEN {
            return Err(reject(format!("{} bytes is shorter than the header", data.len())));
        }
        if data[0] != EXPORT_VERSION {
            return Err(reject(format!("unknown export version 0x{:02x}", data[0])));
        }
        let payload = &data[HEADER_LEN..];
        if payload.len() % 3 != 0 {
            return Err(reject(format!(
                "payload of {} bytes is not a whole number of groups",
                payload.len()
            )));
        }

        let mut set = CapSet::with_space(space);
        set.ns_root = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        for (group, triple) in payload.chunks_exact(3).enumerate() {
            let shift = 8 * (group % 4);
            let word = group / 4;
            let valid = space.all_mask(word);
            for (flag, &byte) in [Flag::Effective, Flag::Permitted, Flag::Inheritable]
                .into_iter()
                .zip(triple)
            {
                let bits = (byte as u32) << shift;
                if bits & !valid != 0 {
                    return Err(reject(format!(
                        "group {group} raises values outside a space of {}",
                        space.max_values()
                    )));
                }
                if bits != 0 {
                    set.flat[word][flag.index()] |= bits;
                }
            }
        }
        Ok(set)
    }
}

fn reject(detail: String) -> CapError {
    tracing::debug!(%detail, "rejecting capability import");
    CapError::bad_export(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Value, CHOWN};

    fn space() -> ValueSpace {
        ValueSpace::new(41)
    }

    fn confirm(set: &CapSet, config: &ExportConfig, size: usize) {
        let ex = set.export_with(config);
        assert_eq!(ex.len(), HEADER_LEN + 3 * size, "export {:02x?}", ex.as_bytes());
        assert_eq!(ex.size(), size);
        let im = CapSet::import_in(set.space(), &ex).unwrap();
        assert_eq!(&im, set);
        assert_eq!(im.to_string(), set.to_string());
    }

    #[test]
    fn test_empty_export() {
        let c = CapSet::with_space(space());
        confirm(&c, &ExportConfig::default(), MIN_EXT_FLAG_SIZE);
        confirm(&c, &ExportConfig { min_ext_flag_size: 0 }, 0);
    }

    #[test]
    fn test_size_tracks_highest_value() {
        for min in 0..5 {
            let config = ExportConfig { min_ext_flag_size: min };
            let mut c = CapSet::with_space(space());
            for i in 0..space().max_values() {
                let flag = Flag::try_from((i % 3) as u8).unwrap();
                c.set_flag(flag, true, &[Value(i)]).unwrap();
                let size = (1 + i as usize / 8).max(min);
                confirm(&c, &config, size);
            }
        }
    }

    #[test]
    fn test_layout() {
        let mut c = CapSet::with_space(space());
        c.set_ns_root(0x0102_0304);
        c.set_flag(Flag::Effective, true, &[CHOWN]).unwrap();
        c.set_flag(Flag::Inheritable, true, &[Value(9)]).unwrap();
        let ex = c.export_with(&ExportConfig { min_ext_flag_size: 0 });
        assert_eq!(
            ex.as_bytes(),
            &[EXPORT_VERSION, 0x04, 0x03, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x02]
        );
    }

    #[test]
    fn test_import_rejects_bad_input() {
        let good = CapSet::with_space(space()).export().into_vec();

        assert!(matches!(CapSet::import_in(space(), &good[..4]), Err(CapError::BadExport(_))));

        let mut wrong_version = good.clone();
        wrong_version[0] = 0x7f;
        assert!(matches!(CapSet::import_in(space(), &wrong_version), Err(CapError::BadExport(_))));

        let mut ragged = good.clone();
        ragged.push(0);
        assert!(matches!(CapSet::import_in(space(), &ragged), Err(CapError::BadExport(_))));
    }

    #[test]
    fn test_import_rejects_values_outside_space() {
        let wide = ValueSpace::new(64);
        let mut c = CapSet::with_space(wide);
        c.set_flag(Flag::Permitted, true, &[Value(50)]).unwrap();
        let ex = c.export();
        assert!(matches!(CapSet::import_in(space(), &ex), Err(CapError::BadExport(_))));

        // Zero padding past the space is fine.
        let narrow = CapSet::with_space(ValueSpace::new(8));
        let padded = CapSet::with_space(space()).export_with(&ExportConfig { min_ext_flag_size: 16 });
        assert_eq!(CapSet::import_in(ValueSpace::new(8), &padded).unwrap(), narrow);
    }

    #[test]
    fn test_short_blob_has_no_groups() {
        let short: Exported = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(short.size(), 0);
        assert_eq!(Exported(Vec::new()).size(), 0);
        assert!(matches!(CapSet::import_in(space(), &short), Err(CapError::BadExport(_))));
    }

    #[test]
    fn test_config_from_json() {
        let config: ExportConfig = serde_json::from_str(r#"{"min_ext_flag_size": 2}"#).unwrap();
        assert_eq!(config.min_ext_flag_size, 2);
        let config: ExportConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ExportConfig::default());
    }
}
