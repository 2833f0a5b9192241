//! Trait interfaces for the collaborators spec §1 names as out of scope:
//! VFS/ELF loading, thread creation, and user-address copyin/copyout.
//!
//! Grounded on the teacher's `machine.rs`/`cap.rs` split, where a thin trait
//! boundary stands in for hardware or services the rest of the crate never
//! implements directly. `syscalls.rs` is generic over these traits so it can
//! be exercised against a fake under test without pulling in a real VFS or
//! scheduler.

use alloc::string::String;

use crate::errno::Errno;

/// Process identifier. Canonical definition lives here since both `hal` and
/// `process` need it and neither owns the other.
pub type Pid = u32;

/// Opaque handle to a loaded executable image, returned by `Vfs::open`.
pub type FileHandle = u64;

/// File loading and lookup. A real implementation backs this with a VFS and
/// an ELF loader; out of scope here (spec §1).
pub trait Vfs {
    fn open(&self, path: &str) -> Result<FileHandle, Errno>;
    fn close(&self, file: FileHandle);

    /// Load the executable's segments into `aspace` via `define_region`, and
    /// return the program's entry point.
    fn load_elf(
        &self,
        file: FileHandle,
        aspace: &mut crate::addrspace::AddressSpace,
    ) -> Result<u64, Errno>;
}

/// An opaque, architecture-specific saved register/stack state. The trap
/// return path that actually resumes user execution from a `TrapFrame` is
/// out of scope; syscalls only need to construct and stash one.
#[derive(Debug, Clone, Default)]
pub struct TrapFrame {
    pub entry_point: u64,
    pub user_sp: u64,
}

/// Thread creation. A real implementation hands `entrypoint`/`frame` to the
/// scheduler and returns once the new thread is runnable; out of scope here
/// (spec §1's "thread scheduler primitives").
pub trait ThreadApi {
    fn fork_thread(&self, child_pid: Pid, frame: TrapFrame) -> Result<(), Errno>;
}

/// User-address copyin/copyout. A real implementation validates the address
/// against the current address space and faults safely on a bad pointer;
/// out of scope here (spec §1's "user-mode trampoline").
pub trait UserMem {
    fn copyin_str(&self, uaddr: u64, max_len: usize) -> Result<String, Errno>;

    /// Read one pointer-sized (8-byte, little-endian) slot of a user argv
    /// array at `uaddr`. `exec` walks an array of these, one per argument,
    /// terminated by a NULL slot (spec §4.5 step 1).
    fn copyin_ptr(&self, uaddr: u64) -> Result<u64, Errno>;

    /// Copy `data` out to `uaddr`, returning the number of bytes written.
    fn copyout(&self, uaddr: u64, data: &[u8]) -> Result<usize, Errno>;

    /// Copy `s` out to `uaddr` followed by a NUL terminator, returning the
    /// number of bytes written (the fix for the bug in spec §9: callers
    /// must use this returned length, not a fixed `PATH_MAX`, when advancing
    /// the argv write cursor).
    fn copyout_str(&self, uaddr: u64, s: &str) -> Result<usize, Errno>;
}
