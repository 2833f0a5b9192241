//! Compile-time constants shared across the core.
//!
//! Collected here rather than beside each module because several of them
//! (`PAGE_SIZE`, `PATH_MAX`) are shared between the frame allocator, address
//! space, and syscall layer.

/// Size of a physical frame / virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of frames backing every process's user stack (fixed size, no
/// demand growth — see spec Non-goals).
pub const STACKPAGES: usize = 12;

/// Virtual address of the top of the user stack. The stack occupies
/// `[USERSTACK - STACKPAGES * PAGE_SIZE, USERSTACK)`.
pub const USERSTACK: u64 = 0x8000_0000;

/// Maximum length of a path or argument string, including the NUL.
pub const PATH_MAX: usize = 1024;

/// Maximum number of argv entries accepted by `exec`.
pub const MAX_ARGS: usize = 64;

/// Number of slots in the (simulated) TLB.
pub const TLB_SIZE: usize = 64;

/// Upper bound on simultaneously-live processes, enforced by the process
/// table so `fork` has a concrete ENPROC to return.
pub const MAX_PROCESSES: usize = 256;
