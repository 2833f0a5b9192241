//! Address types.
//!
//! Per spec §9's re-architecture note ("model physical addresses as a
//! distinct opaque integer type"), physical and virtual addresses are the
//! `x86_64` crate's `PhysAddr`/`VirtAddr` newtypes — the same types the
//! teacher's `memory/paging/mod.rs` uses — rather than bare `u64`s passed
//! around and occasionally confused for one another.

pub use x86_64::{PhysAddr, VirtAddr};

/// Round `addr` down to the nearest page boundary.
pub fn page_align_down(addr: u64, page_size: u64) -> u64 {
    addr & !(page_size - 1)
}

/// Round `size` up to a multiple of the page size.
pub fn page_align_up(size: u64, page_size: u64) -> u64 {
    (size + page_size - 1) & !(page_size - 1)
}
