//! Physical memory and the kernel-virtual alias.
//!
//! Real hardware gives every physical address a fixed-offset "direct map"
//! into kernel-addressable memory; HAL details (cache control, TLB, the
//! mapping itself) are out of scope per spec §1, but something has to hold
//! the actual bytes backing every physical frame so `AddressSpace::copy` and
//! exec's argv marshalling have something to copy. `PhysMem` is that
//! something: a single flat byte buffer indexed by physical offset, playing
//! the role of RAM in this host-testable core.

use alloc::vec;
use alloc::vec::Vec;

use crate::addr::{PhysAddr, VirtAddr};
use crate::errno::Errno;
use crate::sync::SpinLock;

/// Fixed offset of the kernel-virtual direct map, per the glossary entry for
/// "kernel-virtual alias". `free_frames` accepts addresses in either form
/// (spec §9 item 3).
pub const KVBASE: u64 = 0xFFFF_8000_0000_0000;

struct PhysMem {
    base: PhysAddr,
    bytes: Vec<u8>,
}

static PHYS_MEM: SpinLock<Option<PhysMem>> = SpinLock::new(None);

/// Install the backing store for the managed physical window. Called once,
/// by `frame_alloc::bootstrap`.
pub fn init(base: PhysAddr, n_frames: usize, page_size: usize) {
    *PHYS_MEM.lock() = Some(PhysMem {
        base,
        bytes: vec![0u8; n_frames * page_size],
    });
}

/// Map a kernel-virtual alias back down to a physical address. Addresses
/// already in physical form pass through unchanged.
pub fn normalize(addr: PhysAddr) -> PhysAddr {
    let raw = addr.as_u64();
    if raw >= KVBASE {
        PhysAddr::new(raw - KVBASE)
    } else {
        addr
    }
}

/// The kernel-virtual alias of a physical address.
pub fn kvmap(addr: PhysAddr) -> VirtAddr {
    VirtAddr::new(normalize(addr).as_u64() + KVBASE)
}

fn offset(base: PhysAddr, addr: PhysAddr, len: usize, total: usize) -> Result<usize, Errno> {
    let addr = normalize(addr);
    let off = addr
        .as_u64()
        .checked_sub(base.as_u64())
        .ok_or(Errno::Fault)? as usize;
    if off.checked_add(len).map_or(true, |end| end > total) {
        return Err(Errno::Fault);
    }
    Ok(off)
}

pub fn read_bytes(addr: PhysAddr, len: usize) -> Result<Vec<u8>, Errno> {
    let mem = PHYS_MEM.lock();
    let mem = mem.as_ref().ok_or(Errno::Fault)?;
    let off = offset(mem.base, addr, len, mem.bytes.len())?;
    Ok(mem.bytes[off..off + len].to_vec())
}

pub fn write_bytes(addr: PhysAddr, data: &[u8]) -> Result<(), Errno> {
    let mut mem = PHYS_MEM.lock();
    let mem = mem.as_mut().ok_or(Errno::Fault)?;
    let off = offset(mem.base, addr, data.len(), mem.bytes.len())?;
    mem.bytes[off..off + data.len()].copy_from_slice(data);
    Ok(())
}

/// Byte-copy `len` bytes from `src` to `dst`, both physical addresses.
pub fn copy_bytes(dst: PhysAddr, src: PhysAddr, len: usize) -> Result<(), Errno> {
    let data = read_bytes(src, len)?;
    write_bytes(dst, &data)
}

#[cfg(test)]
pub fn reset_for_test() {
    *PHYS_MEM.lock() = None;
}
