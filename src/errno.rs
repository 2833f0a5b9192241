//! Error codes returned across the syscall boundary.
//!
//! Every fallible operation in this crate returns `Result<T, Errno>`; there
//! is no panicking error path reachable from a caller (see spec §7 and the
//! bug fix in §9 turning the allocator's old "OOM -> panic" into `ENOMEM`).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Out of memory (frame allocator or kmalloc-equivalent exhaustion).
    Nomem,
    /// Bad user address, or no address space installed.
    Fault,
    /// Invalid argument (unknown fault kind, unknown waitpid option, no more
    /// region slots).
    Inval,
    /// exec's argv exceeded the configured bound.
    TooBig,
    /// waitpid on a pid with no matching process table entry.
    Srch,
    /// waitpid on a pid that is not the caller's child.
    Child,
    /// fork failed because the process table is full.
    NProc,
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Errno::Nomem => "ENOMEM",
            Errno::Fault => "EFAULT",
            Errno::Inval => "EINVAL",
            Errno::TooBig => "E2BIG",
            Errno::Srch => "ESRCH",
            Errno::Child => "ECHILD",
            Errno::NProc => "ENPROC",
        };
        f.write_str(name)
    }
}
