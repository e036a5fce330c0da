//! Shared vocabulary types: capability values, flag planes and IAB vectors.
//!
//! A [`Value`] is an opaque index into the capability universe. The first
//! [`NAMED_COUNT`] values have well-known names; anything above prints as a
//! plain decimal number so that newer kernels can hand us values this crate
//! has never heard of.

use crate::error::CapError;
use std::fmt;

/// One capability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Value(pub u32);

/// Names of the capability values known at build time, indexed by value.
pub const NAMES: [&str; 41] = [
    "cap_chown",
    "cap_dac_override",
    "cap_dac_read_search",
    "cap_fowner",
    "cap_fsetid",
    "cap_kill",
    "cap_setgid",
    "cap_setuid",
    "cap_setpcap",
    "cap_linux_immutable",
    "cap_net_bind_service",
    "cap_net_broadcast",
    "cap_net_admin",
    "cap_net_raw",
    "cap_ipc_lock",
    "cap_ipc_owner",
    "cap_sys_module",
    "cap_sys_rawio",
    "cap_sys_chroot",
    "cap_sys_ptrace",
    "cap_sys_pacct",
    "cap_sys_admin",
    "cap_sys_boot",
    "cap_sys_nice",
    "cap_sys_resource",
    "cap_sys_time",
    "cap_sys_tty_config",
    "cap_mknod",
    "cap_lease",
    "cap_audit_write",
    "cap_audit_control",
    "cap_setfcap",
    "cap_mac_override",
    "cap_mac_admin",
    "cap_syslog",
    "cap_wake_alarm",
    "cap_block_suspend",
    "cap_audit_read",
    "cap_perfmon",
    "cap_bpf",
    "cap_checkpoint_restore",
];

/// Number of values with a known name.
pub const NAMED_COUNT: u32 = NAMES.len() as u32;

pub const CHOWN: Value = Value(0);
pub const DAC_OVERRIDE: Value = Value(1);
pub const DAC_READ_SEARCH: Value = Value(2);
pub const FOWNER: Value = Value(3);
pub const FSETID: Value = Value(4);
pub const KILL: Value = Value(5);
pub const SETGID: Value = Value(6);
pub const SETUID: Value = Value(7);
pub const SETPCAP: Value = Value(8);
pub const LINUX_IMMUTABLE: Value = Value(9);
pub const NET_BIND_SERVICE: Value = Value(10);
pub const NET_BROADCAST: Value = Value(11);
pub const NET_ADMIN: Value = Value(12);
pub const NET_RAW: Value = Value(13);
pub const IPC_LOCK: Value = Value(14);
pub const IPC_OWNER: Value = Value(15);
pub const SYS_MODULE: Value = Value(16);
pub const SYS_RAWIO: Value = Value(17);
pub const SYS_CHROOT: Value = Value(18);
pub const SYS_PTRACE: Value = Value(19);
pub const SYS_PACCT: Value = Value(20);
pub const SYS_ADMIN: Value = Value(21);
pub const SYS_BOOT: Value = Value(22);
pub const SYS_NICE: Value = Value(23);
pub const SYS_RESOURCE: Value = Value(24);
pub const SYS_TIME: Value = Value(25);
pub const SYS_TTY_CONFIG: Value = Value(26);
pub const MKNOD: Value = Value(27);
pub const LEASE: Value = Value(28);
pub const AUDIT_WRITE: Value = Value(29);
pub const AUDIT_CONTROL: Value = Value(30);
pub const SETFCAP: Value = Value(31);
pub const MAC_OVERRIDE: Value = Value(32);
pub const MAC_ADMIN: Value = Value(33);
pub const SYSLOG: Value = Value(34);
pub const WAKE_ALARM: Value = Value(35);
pub const BLOCK_SUSPEND: Value = Value(36);
pub const AUDIT_READ: Value = Value(37);
pub const PERFMON: Value = Value(38);
pub const BPF: Value = Value(39);
pub const CHECKPOINT_RESTORE: Value = Value(40);

impl Value {
    /// Looks up a value by name (case-insensitive) or decimal number.
    ///
    /// Only the syntax is checked here; whether the value fits the current
    /// value space is the caller's concern.
    pub fn from_name(name: &str) -> Result<Value, CapError> {
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            return name
                .parse::<u32>()
                .map(Value)
                .map_err(|_| CapError::bad_text(format!("value {name:?} overflows")));
        }
        NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Value(i as u32))
            .ok_or_else(|| CapError::bad_text(format!("unknown capability {name:?}")))
    }

    /// The well-known name, if this value has one.
    pub fn name(self) -> Option<&'static str> {
        NAMES.get(self.0 as usize).copied()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(n) => f.write_str(n),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value(v)
    }
}

/// Flag plane selector within a [`crate::CapSet`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Flag {
    Effective = 0,
    Permitted = 1,
    Inheritable = 2,
}

impl Flag {
    pub const ALL: [Flag; 3] = [Flag::Effective, Flag::Permitted, Flag::Inheritable];

    /// Text letter used by the capability grammar.
    pub fn letter(self) -> char {
        match self {
            Flag::Effective => 'e',
            Flag::Permitted => 'p',
            Flag::Inheritable => 'i',
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Flag {
    type Error = CapError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Flag::Effective),
            1 => Ok(Flag::Permitted),
            2 => Ok(Flag::Inheritable),
            _ => Err(CapError::BadValue(value as u32)),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Vector selector within an [`crate::Iab`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Vector {
    /// Inheritable.
    Inh = 0,
    /// Ambient.
    Amb = 1,
    /// Bounding; stored inverted as the "not bound" vector.
    Bound = 2,
}

impl TryFrom<u8> for Vector {
    type Error = CapError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Vector::Inh),
            1 => Ok(Vector::Amb),
            2 => Ok(Vector::Bound),
            _ => Err(CapError::BadValue(value as u32)),
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Vector::Inh => "I",
            Vector::Amb => "A",
            Vector::Bound => "B",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chown_name() {
        assert_eq!(CHOWN.to_string(), "cap_chown");
        assert_eq!(CHECKPOINT_RESTORE.to_string(), "cap_checkpoint_restore");
    }

    #[test]
    fn test_unnamed_values_print_as_numbers() {
        assert_eq!(Value(NAMED_COUNT).to_string(), "41");
        assert_eq!(Value(63).to_string(), "63");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Value::from_name("cap_setfcap").unwrap(), SETFCAP);
        assert_eq!(Value::from_name("CAP_SYS_ADMIN").unwrap(), SYS_ADMIN);
        assert_eq!(Value::from_name("7").unwrap(), SETUID);
        assert_eq!(Value::from_name("63").unwrap(), Value(63));
        assert!(matches!(Value::from_name("cup_full"), Err(CapError::BadText(_))));
        assert!(matches!(Value::from_name(""), Err(CapError::BadText(_))));
        assert!(matches!(Value::from_name("99999999999"), Err(CapError::BadText(_))));
    }

    #[test]
    fn test_flag_and_vector_tags() {
        assert_eq!(Flag::try_from(1).unwrap(), Flag::Permitted);
        assert!(Flag::try_from(3).is_err());
        assert_eq!(Vector::try_from(2).unwrap(), Vector::Bound);
        assert!(Vector::try_from(7).is_err());
    }
}
