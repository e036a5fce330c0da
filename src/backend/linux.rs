//!
//! Linux implementation of [`CapBackend`] over `capget(2)`, `capset(2)` and
//! `prctl(2)`.
//!
//! The capability header version decides how many 32-bit words the kernel
//! exchanges. We start with version 3 and, if the kernel answers `EINVAL`
//! with a different version in the header, retry with the one it prefers.
#![allow(unsafe_code)]

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use super::CapBackend;
use crate::error::CapError;
use crate::set::CapSet;
use crate::space::{ValueSpace, WORD_BITS};
use crate::types::{Flag, Value};

pub const LINUX_CAPABILITY_VERSION_1: u32 = 0x1998_0330;
pub const LINUX_CAPABILITY_VERSION_2: u32 = 0x2007_1026;
pub const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

fn words_for(version: u32) -> Option<usize> {
    match version {
        LINUX_CAPABILITY_VERSION_1 => Some(1),
        LINUX_CAPABILITY_VERSION_2 | LINUX_CAPABILITY_VERSION_3 => Some(2),
        _ => None,
    }
}

fn os_error(call: &str) -> CapError {
    CapError::Backend(format!("{call}: {}", io::Error::last_os_error()))
}

/// Talks to the running kernel on behalf of the calling thread.
#[derive(Debug)]
pub struct LinuxBackend {
    version: AtomicU32,
}

impl LinuxBackend {
    pub fn new() -> Self {
        LinuxBackend {
            version: AtomicU32::new(LINUX_CAPABILITY_VERSION_3),
        }
    }

    /// Sizes the process-wide value space from the kernel and settles the
    /// header version. Call once at start-up.
    pub fn negotiate(&self) -> Result<ValueSpace, CapError> {
        let probed = ValueSpace::probe()?;
        ValueSpace::set_current(probed);
        // A capget also shrinks the space if the header version holds fewer words.
        self.get_proc()?;
        Ok(ValueSpace::current())
    }

    /// Header version currently in use.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Relaxed)
    }

    fn capget(&self, pid: i32) -> Result<CapSet, CapError> {
        let mut version = self.version();
        for _ in 0..2 {
            let words = words_for(version)
                .ok_or_else(|| CapError::Backend(format!("unknown header version {version:#x}")))?;
            let mut header = CapUserHeader { version, pid };
            let mut data = [CapUserData::default(); 2];
            // SAFETY: header and data are valid for the kernel to write; data
            // holds the two entries any known header version needs.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_capget,
                    &mut header as *mut CapUserHeader,
                    data.as_mut_ptr(),
                )
            };
            if rc == 0 {
                return Ok(to_set(&data[..words]));
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINVAL)
                && header.version != version
                && words_for(header.version).is_some()
            {
                tracing::debug!(
                    requested = version,
                    preferred = header.version,
                    "kernel prefers another capability header version"
                );
                self.version.store(header.version, Ordering::Relaxed);
                version = header.version;
                continue;
            }
            return Err(CapError::Backend(format!("capget: {err}")));
        }
        Err(CapError::Backend("capget: header version did not settle".into()))
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a set from kernel words, shrinking the process value space if the
/// kernel exchanges fewer words than it covers.
fn to_set(data: &[CapUserData]) -> CapSet {
    let current = ValueSpace::current();
    let limit = data.len() as u32 * WORD_BITS;
    let space = if current.max_values() > limit {
        let shrunk = ValueSpace::new(limit);
        ValueSpace::set_current(shrunk);
        shrunk
    } else {
        current
    };

    let mut set = CapSet::with_space(space);
    for (i, d) in data.iter().enumerate().take(space.words()) {
        let valid = space.all_mask(i);
        set.flat[i] = [d.effective & valid, d.permitted & valid, d.inheritable & valid];
    }
    set
}

impl CapBackend for LinuxBackend {
    fn get_proc(&self) -> Result<CapSet, CapError> {
        self.capget(0)
    }

    fn set_proc(&self, set: &CapSet) -> Result<(), CapError> {
        let version = self.version();
        let words = words_for(version)
            .ok_or_else(|| CapError::Backend(format!("unknown header version {version:#x}")))?;
        for i in words..set.space().words() {
            if Flag::ALL.iter().any(|&f| set.word(f, i) != 0) {
                return Err(CapError::BadValue(i as u32 * WORD_BITS));
            }
        }

        let mut header = CapUserHeader { version, pid: 0 };
        let mut data = [CapUserData::default(); 2];
        for (i, d) in data.iter_mut().enumerate().take(words) {
            *d = CapUserData {
                effective: set.word(Flag::Effective, i),
                permitted: set.word(Flag::Permitted, i),
                inheritable: set.word(Flag::Inheritable, i),
            };
        }
        // SAFETY: header and data are initialised and outlive the call.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_capset,
                &mut header as *mut CapUserHeader,
                data.as_ptr(),
            )
        };
        if rc != 0 {
            return Err(os_error("capset"));
        }
        Ok(())
    }

    fn get_pid(&self, pid: i32) -> Result<CapSet, CapError> {
        self.capget(pid)
    }

    fn prctl(&self, request: i32, args: [u64; 4]) -> Result<i32, CapError> {
        // SAFETY: prctl takes integer arguments only for the requests used here;
        // callers passing pointer-taking requests own that contract.
        let rc = unsafe {
            libc::prctl(
                request,
                args[0] as libc::c_ulong,
                args[1] as libc::c_ulong,
                args[2] as libc::c_ulong,
                args[3] as libc::c_ulong,
            )
        };
        if rc < 0 {
            return Err(os_error("prctl"));
        }
        Ok(rc)
    }

    fn get_bound(&self, value: Value) -> Result<bool, CapError> {
        let rc = self.prctl(libc::PR_CAPBSET_READ, [value.0 as u64, 0, 0, 0])?;
        Ok(rc == 1)
    }

    fn drop_bound(&self, value: Value) -> Result<(), CapError> {
        self.prctlw(libc::PR_CAPBSET_DROP, [value.0 as u64, 0, 0, 0])?;
        Ok(())
    }

    fn get_ambient(&self, value: Value) -> Result<bool, CapError> {
        let rc = self.prctl(
            libc::PR_CAP_AMBIENT,
            [libc::PR_CAP_AMBIENT_IS_SET as u64, value.0 as u64, 0, 0],
        )?;
        Ok(rc == 1)
    }

    fn set_ambient(&self, value: Value, raised: bool) -> Result<(), CapError> {
        let op = if raised {
            libc::PR_CAP_AMBIENT_RAISE
        } else {
            libc::PR_CAP_AMBIENT_LOWER
        };
        self.prctlw(libc::PR_CAP_AMBIENT, [op as u64, value.0 as u64, 0, 0])?;
        Ok(())
    }

    fn reset_ambient(&self) -> Result<(), CapError> {
        self.prctlw(
            libc::PR_CAP_AMBIENT,
            [libc::PR_CAP_AMBIENT_CLEAR_ALL as u64, 0, 0, 0],
        )?;
        Ok(())
    }

    fn get_secbits(&self) -> Result<u32, CapError> {
        Ok(self.prctl(libc::PR_GET_SECUREBITS, [0; 4])? as u32)
    }

    fn set_secbits(&self, bits: u32) -> Result<(), CapError> {
        self.prctlw(libc::PR_SET_SECUREBITS, [bits as u64, 0, 0, 0])?;
        Ok(())
    }

    fn keep_caps(&self) -> Result<bool, CapError> {
        Ok(self.prctl(libc::PR_GET_KEEPCAPS, [0; 4])? == 1)
    }

    fn set_keep_caps(&self, keep: bool) -> Result<(), CapError> {
        self.prctlw(libc::PR_SET_KEEPCAPS, [keep as u64, 0, 0, 0])?;
        Ok(())
    }
}
