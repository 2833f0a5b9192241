//! A teaching kernel core: physical frame allocation, per-process address
//! spaces, page-fault handling, process lifecycle syscalls, and an
//! intersection-monitor concurrency exemplar.
//!
//! `no_std` + `alloc` in production, matching the teacher's own
//! `#![no_std]` kernel; under `cfg(test)` the crate links against `std` so
//! the concurrency-sensitive parts (the process table, the intersection
//! monitor) can be driven by real OS threads instead of a stub scheduler.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), feature(alloc_error_handler))]

extern crate alloc;

#[cfg(not(test))]
extern crate rlibc;

#[macro_use]
pub mod debug;

pub mod addr;
pub mod addrspace;
pub mod config;
pub mod errno;
pub mod fault;
pub mod frame_alloc;
pub mod hal;
#[cfg(not(test))]
pub mod heap;
pub mod intersection;
pub mod process;
pub mod ram;
pub mod sync;
pub mod syscalls;
pub mod wait;

#[cfg(not(test))]
mod panic {
    use core::panic::PanicInfo;

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        printk!("\n========{{ PANIC }}========\n");
        if let Some(loc) = info.location() {
            printk!("{}:{}:{}\n", loc.file(), loc.line(), loc.column());
        }
        if let Some(msg) = info.message() {
            printk!("{}\n", msg);
        }
        loop {
            core::hint::spin_loop();
        }
    }

    #[alloc_error_handler]
    fn alloc_error(layout: core::alloc::Layout) -> ! {
        printk!("\nout of kernel heap memory: {:?}\n", layout);
        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(not(test))]
#[global_allocator]
static mut ALLOCATOR: heap::KernelAllocator = heap::KernelAllocator::new();
