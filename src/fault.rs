//! Fault handler and TLB. Spec §4.3.
//!
//! The teacher's own page-fault entry point
//! (`memory/paging/mod.rs::handle_page_fault`) is a stub that reads CR2 and
//! panics — exactly the "dumbvm panics" behavior spec §9 flags as a bug to
//! fix, not reproduce. This module keeps the entry-point shape (read the
//! fault kind and address, look at the TLB, install an entry) and replaces
//! the panic with the real translate-and-install logic, plus the
//! random-replacement fallback the spec asks to add.

use crate::addr::{page_align_down, PhysAddr, VirtAddr};
use crate::addrspace::{AddressSpace, RegionKind};
use crate::config::{PAGE_SIZE, TLB_SIZE};
use crate::errno::Errno;
use crate::sync::SpinLock;
use core::sync::atomic::{AtomicUsize, Ordering};
use x86_64::structures::paging::PageTableFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ReadOnly,
    Read,
    Write,
    Other,
}

/// What the trap handler (out of scope here) should do after `handle`
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// A TLB entry was installed; retry the faulting instruction.
    Installed,
    /// A write to read-only text: the caller must terminate the process
    /// with a non-zero exit status via the syscall return path.
    Terminate,
    Err(Errno),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub va: VirtAddr,
    pub pa: PhysAddr,
    pub flags: PageTableFlags,
}

/// A fixed-slot TLB. `None` means the slot is invalid (free).
pub struct Tlb {
    slots: [Option<TlbEntry>; TLB_SIZE],
}

impl Tlb {
    const fn new() -> Self {
        Tlb {
            slots: [None; TLB_SIZE],
        }
    }

    fn first_invalid(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn write(&mut self, index: usize, entry: TlbEntry) {
        self.slots[index] = Some(entry);
    }

    /// Stands in for the hardware random-replacement primitive (spec §9):
    /// any slot is an acceptable victim once the TLB is full, since
    /// correctness depends only on re-faulting eventually, never on which
    /// slot gets evicted.
    fn write_random(&mut self, entry: TlbEntry) {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let idx = NEXT.fetch_add(1, Ordering::Relaxed) % TLB_SIZE;
        self.slots[idx] = Some(entry);
    }

    fn flush_all(&mut self) {
        self.slots = [None; TLB_SIZE];
    }

    #[cfg(test)]
    fn probe(&self, va: VirtAddr) -> Option<TlbEntry> {
        self.slots.iter().flatten().find(|e| e.va == va).copied()
    }
}

static CURRENT_TLB: SpinLock<Tlb> = SpinLock::new(Tlb::new());

/// Invalidate every TLB entry for the current CPU. Called by
/// `AddressSpace::activate`.
pub fn tlb_flush_all() {
    CURRENT_TLB.lock().flush_all();
}

/// Handle a fault of the given `kind` at `va` against `aspace` (the current
/// process's address space, or `None` if no process/address space is
/// installed yet — a boot-time guard).
pub fn handle(aspace: Option<&AddressSpace>, kind: FaultKind, va: VirtAddr) -> FaultOutcome {
    if kind == FaultKind::ReadOnly {
        return FaultOutcome::Terminate;
    }
    if kind == FaultKind::Other {
        return FaultOutcome::Err(Errno::Inval);
    }

    let aspace = match aspace {
        Some(a) => a,
        None => return FaultOutcome::Err(Errno::Fault),
    };

    let va = VirtAddr::new(page_align_down(va.as_u64(), PAGE_SIZE as u64));

    let (pa, region) = match aspace.translate(va) {
        Some(x) => x,
        None => return FaultOutcome::Err(Errno::Fault),
    };

    let mut flags = PageTableFlags::PRESENT | PageTableFlags::DIRTY;
    if region == RegionKind::First && aspace.loaded() {
        flags.remove(PageTableFlags::DIRTY);
    }
    let entry = TlbEntry { va, pa, flags };

    // The whole scan-and-write happens under the TLB's lock, this crate's
    // equivalent of raising priority level to splhigh for the duration.
    let mut tlb = CURRENT_TLB.lock();
    match tlb.first_invalid() {
        Some(idx) => tlb.write(idx, entry),
        None => tlb.write_random(entry),
    }

    FaultOutcome::Installed
}
