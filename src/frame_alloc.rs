//! The Core Map — physical frame bookkeeping. Spec §4.1.
//!
//! Grounded on the teacher's `memory/paging/mod.rs`, which holds a single
//! `Mutex<Option<BuddyAllocator<usize>>>` behind `stealmem_lock`-equivalent
//! locking and fills it in from E820 info at `init` time. Same shape here —
//! a single `SpinLock<Option<CoreMap>>` — with the buddy tree swapped for
//! the spec's run-length-per-frame encoding (spec §9: "the 'run length
//! stored at every frame' trick allows O(run) free without a separate data
//! structure; keep it").

use alloc::vec;
use alloc::vec::Vec;

use crate::addr::{page_align_up, PhysAddr};
use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::ram;
use crate::sync::SpinLock;

pub struct CoreMap {
    base: PhysAddr,
    n: usize,
    /// `run_len[i]` is 0 if frame `i` is free, otherwise the length of the
    /// (possibly multi-frame) allocation it belongs to.
    run_len: Vec<usize>,
}

impl CoreMap {
    /// Build the core map over `[lo, hi)`. The frame-record array itself is
    /// carved out of the front of the window, then `base` is rounded up to a
    /// page boundary — the same bump-then-align sequence the teacher's
    /// `init` performs for the kernel heap and page tables.
    fn bootstrap(lo: PhysAddr, hi: PhysAddr) -> Self {
        let n_upper_bound = ((hi.as_u64() - lo.as_u64()) / PAGE_SIZE as u64) as usize;
        let array_bytes = n_upper_bound * core::mem::size_of::<usize>();
        let after_array = lo.as_u64() + array_bytes as u64;
        let base = PhysAddr::new(page_align_up(after_array, PAGE_SIZE as u64));
        let n = ((hi.as_u64() - base.as_u64()) / PAGE_SIZE as u64) as usize;

        ram::init(base, n, PAGE_SIZE);

        CoreMap {
            base,
            n,
            run_len: vec![0usize; n],
        }
    }

    fn alloc(&mut self, count: usize) -> Result<PhysAddr, Errno> {
        if count == 0 || count > self.n {
            return Err(Errno::Nomem);
        }

        let mut i = 0;
        while i + count <= self.n {
            if self.run_len[i] != 0 {
                i += 1;
                continue;
            }

            match (i..i + count).find(|&j| self.run_len[j] != 0) {
                Some(obstruction) => i = obstruction + 1,
                None => {
                    for j in i..i + count {
                        self.run_len[j] = count;
                    }
                    return Ok(PhysAddr::new(
                        self.base.as_u64() + (i * PAGE_SIZE) as u64,
                    ));
                }
            }
        }

        Err(Errno::Nomem)
    }

    fn free(&mut self, addr: PhysAddr) {
        let addr = ram::normalize(addr);
        if addr.as_u64() < self.base.as_u64() {
            printk!("free_frames: address below core map base, ignoring\n");
            return;
        }

        let idx = ((addr.as_u64() - self.base.as_u64()) / PAGE_SIZE as u64) as usize;
        if idx >= self.n || self.run_len[idx] == 0 {
            printk!("free_frames: address does not belong to a live run, ignoring\n");
            return;
        }

        let run = self.run_len[idx];
        for j in idx..idx + run {
            self.run_len[j] = 0;
        }
    }

    fn stats(&self) -> (usize, usize) {
        (self.n, self.run_len.iter().filter(|&&r| r == 0).count())
    }
}

static CORE_MAP: SpinLock<Option<CoreMap>> = SpinLock::new(None);

/// Initialize the core map from the free RAM window `[lo, hi)` reported by
/// the (external) boot/RAM-probe collaborator.
pub fn bootstrap(lo: PhysAddr, hi: PhysAddr) {
    *CORE_MAP.lock() = Some(CoreMap::bootstrap(lo, hi));
}

/// Allocate a contiguous run of `count` frames. Returns the physical base of
/// the run.
pub fn alloc_frames(count: usize) -> Result<PhysAddr, Errno> {
    match CORE_MAP.lock().as_mut() {
        Some(map) => map.alloc(count),
        None => Err(Errno::Nomem),
    }
}

/// Free the run starting at `addr` (physical or kernel-virtual form). A no-op
/// if `addr` is not the base of any live run.
pub fn free_frames(addr: PhysAddr) {
    if let Some(map) = CORE_MAP.lock().as_mut() {
        map.free(addr);
    }
}

/// `(total frames, free frames)`, for diagnostics only.
pub fn stats() -> Option<(usize, usize)> {
    CORE_MAP.lock().as_ref().map(CoreMap::stats)
}

#[cfg(test)]
pub fn reset_for_test(n: usize) {
    let base = PhysAddr::new(0x1000);
    ram::reset_for_test();
    ram::init(base, n, PAGE_SIZE);
    *CORE_MAP.lock() = Some(CoreMap {
        base,
        n,
        run_len: vec![0usize; n],
    });
}
