//! Per-process address space. Spec §4.2.
//!
//! Grounded on the teacher's `memory/paging/mod.rs`, which allocates
//! physical runs from the frame allocator and flushes the TLB on install —
//! the same shape used here, generalized from one direct-mapped kernel
//! address space to the two-region-plus-stack per-process layout the spec
//! requires.

use crate::addr::{page_align_down, page_align_up, PhysAddr, VirtAddr};
use crate::config::{PAGE_SIZE, STACKPAGES, USERSTACK};
use crate::errno::Errno;
use crate::frame_alloc::{alloc_frames, free_frames};
use crate::ram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Region 1: text/rodata, read-only once `loaded`.
    First,
    /// Region 2: data/bss.
    Second,
    Stack,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    vbase: VirtAddr,
    npages: usize,
    pbase: PhysAddr,
    #[allow(dead_code)]
    readable: bool,
    #[allow(dead_code)]
    writable: bool,
    #[allow(dead_code)]
    executable: bool,
}

pub struct AddressSpace {
    regions: [Option<Region>; 2],
    stackpbase: Option<PhysAddr>,
    loaded: bool,
}

impl AddressSpace {
    /// An empty address space with zero regions.
    pub fn create() -> Self {
        AddressSpace {
            regions: [None, None],
            stackpbase: None,
            loaded: false,
        }
    }

    /// Define a region, filling the first empty slot. `vaddr`/`size` are
    /// rounded to page multiples.
    pub fn define_region(
        &mut self,
        vaddr: VirtAddr,
        size: u64,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Result<(), Errno> {
        let vbase = VirtAddr::new(page_align_down(vaddr.as_u64(), PAGE_SIZE as u64));
        let extra = vaddr.as_u64() - vbase.as_u64();
        let npages = (page_align_up(size + extra, PAGE_SIZE as u64) / PAGE_SIZE as u64) as usize;

        let slot = self
            .regions
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Errno::Inval)?;

        *slot = Some(Region {
            vbase,
            npages,
            pbase: PhysAddr::new(0),
            readable,
            writable,
            executable,
        });
        Ok(())
    }

    /// Allocate the three physical runs backing the two regions and the
    /// stack. Precondition: none are allocated yet. Any runs allocated
    /// before an OOM remain allocated — the caller must call `destroy`.
    pub fn prepare_load(&mut self) -> Result<(), Errno> {
        let already_prepared = self.stackpbase.is_some()
            || self.regions.iter().flatten().any(|r| r.pbase.as_u64() != 0);
        if already_prepared {
            return Err(Errno::Inval);
        }

        for region in self.regions.iter_mut().flatten() {
            region.pbase = alloc_frames(region.npages)?;
        }
        self.stackpbase = Some(alloc_frames(STACKPAGES)?);
        Ok(())
    }

    /// Mark the address space loaded (region 1 becomes read-only) and flush
    /// the TLB so stale entries from before loading can't survive.
    pub fn complete_load(&mut self) {
        self.loaded = true;
        self.activate();
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// The fixed virtual address of the top of the user stack.
    pub fn define_stack(&self) -> VirtAddr {
        VirtAddr::new(USERSTACK)
    }

    /// Create a new address space with identical region geometry, fresh
    /// physical runs, and byte-identical contents (round-trip law in spec
    /// §8). The caller still owns `self` and must destroy it separately.
    pub fn copy(&self) -> Result<AddressSpace, Errno> {
        let mut new_as = AddressSpace::create();
        for (slot, region) in new_as.regions.iter_mut().zip(self.regions.iter()) {
            if let Some(region) = region {
                *slot = Some(Region {
                    pbase: PhysAddr::new(0),
                    ..*region
                });
            }
        }
        // `prepare_load`'s own contract leaves any runs it allocated before
        // an OOM live, on the theory that *its* caller will destroy them;
        // `copy` is that caller, so an error past this point must tear down
        // `new_as` itself rather than let it leak silently when dropped.
        if let Err(e) = new_as.prepare_load() {
            new_as.destroy();
            return Err(e);
        }

        for (old, new) in self.regions.iter().zip(new_as.regions.iter()) {
            if let (Some(old), Some(new)) = (old, new) {
                if let Err(e) = ram::copy_bytes(new.pbase, old.pbase, old.npages * PAGE_SIZE) {
                    new_as.destroy();
                    return Err(e);
                }
            }
        }
        if let (Some(old_stack), Some(new_stack)) = (self.stackpbase, new_as.stackpbase) {
            if let Err(e) = ram::copy_bytes(new_stack, old_stack, STACKPAGES * PAGE_SIZE) {
                new_as.destroy();
                return Err(e);
            }
        }

        Ok(new_as)
    }

    /// Invalidate the TLB for the current CPU.
    pub fn activate(&self) {
        crate::fault::tlb_flush_all();
    }

    /// Free all physical runs backing this address space.
    pub fn destroy(self) {
        for region in self.regions.iter().flatten() {
            free_frames(region.pbase);
        }
        if let Some(stack) = self.stackpbase {
            free_frames(stack);
        }
    }

    /// Translation contract: `va` (page offset preserved) maps to a physical
    /// address and the region it falls in, or `None` if out of bounds.
    pub fn translate(&self, va: VirtAddr) -> Option<(PhysAddr, RegionKind)> {
        for (i, region) in self.regions.iter().enumerate() {
            if let Some(region) = region {
                let start = region.vbase.as_u64();
                let end = start + (region.npages * PAGE_SIZE) as u64;
                if va.as_u64() >= start && va.as_u64() < end {
                    let pa = region.pbase.as_u64() + (va.as_u64() - start);
                    let kind = if i == 0 {
                        RegionKind::First
                    } else {
                        RegionKind::Second
                    };
                    return Some((PhysAddr::new(pa), kind));
                }
            }
        }

        if let Some(stackpbase) = self.stackpbase {
            let stack_start = USERSTACK - (STACKPAGES * PAGE_SIZE) as u64;
            if va.as_u64() >= stack_start && va.as_u64() < USERSTACK {
                let pa = stackpbase.as_u64() + (va.as_u64() - stack_start);
                return Some((PhysAddr::new(pa), RegionKind::Stack));
            }
        }

        None
    }
}
