//! Process syscalls: fork, exec, exit, waitpid, getpid. Spec §4.5.
//!
//! Grounded on the teacher's `process/mod.rs`/`sched.rs`, which bundles "the
//! thing that creates new units of execution" behind a single lock-guarded
//! static and a small set of free functions. Here the equivalent surface is
//! a `Syscalls` handle holding the three `hal` collaborators (VFS, thread
//! creation, user memory) that a real trap handler would thread through;
//! bundling them avoids five-argument free functions while staying generic
//! over the fakes `hal::test_support` supplies.
//!
//! All three explicitly-flagged bugs that live in this area are fixed here,
//! not reproduced: fork records the child's parent as the forking process's
//! own pid, not its grandparent's; a failed `fork_thread` destroys the
//! half-built child instead of leaking it; and exec's argv marshalling
//! advances the stack pointer by the length `copyout_str` actually reports,
//! not a fixed `PATH_MAX`.
//!
//! `fork` takes the caller's trapframe by reference and clones it for the
//! new thread (spec §4.5 step 3); `exec` counts argv by walking the user
//! pointer array itself rather than delegating that to the HAL; and
//! `waitpid` validates `options`/`status_uptr` and copies the exit status out
//! through `UserMem::copyout` rather than returning it by value.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::addrspace::AddressSpace;
use crate::config::{MAX_ARGS, PATH_MAX};
use crate::errno::Errno;
use crate::hal::{Pid, ThreadApi, TrapFrame, UserMem, Vfs};
use crate::process::{self, Process};
use crate::wait::encode_exit_status;

pub struct Syscalls<'a> {
    pub vfs: &'a dyn Vfs,
    pub threads: &'a dyn ThreadApi,
    pub mem: &'a dyn UserMem,
}

impl<'a> Syscalls<'a> {
    /// Duplicate `parent` into a new process with a copy of its address
    /// space, handing the new thread a copy of `trapframe` so it resumes
    /// where `parent` called fork from (spec §4.5 step 3). Returns the
    /// child's pid to the parent.
    pub fn fork(&self, parent: &Arc<Process>, trapframe: &TrapFrame) -> Result<Pid, Errno> {
        let child_as = {
            let guard = parent.addrspace.lock();
            let parent_as = guard.as_ref().ok_or(Errno::Fault)?;
            parent_as.copy()?
        };

        let child = process::create(parent.pid, parent.name.clone())?;
        *child.addrspace.lock() = Some(child_as);

        if let Err(e) = self.threads.fork_thread(child.pid, trapframe.clone()) {
            // The child was fully created (table entry + address space) but
            // will never run: tear it down rather than leaking its frames
            // and table slot.
            if let Some(a) = child.addrspace.lock().take() {
                a.destroy();
            }
            process::remove(child.pid);
            return Err(e);
        }

        parent.children.lock().push(child.pid);
        Ok(child.pid)
    }

    /// Replace `caller`'s address space with a freshly loaded program,
    /// returning the trap frame a (not-implemented-here) return-to-user path
    /// would resume into.
    pub fn exec(
        &self,
        caller: &Arc<Process>,
        path_uaddr: u64,
        argv_uaddr: u64,
    ) -> Result<TrapFrame, Errno> {
        let path = self.mem.copyin_str(path_uaddr, PATH_MAX)?;

        // Step 1: walk the argv pointer array one 8-byte slot at a time
        // until a NULL slot, bounding the count at MAX_ARGS (spec §4.5 step
        // 1, E2BIG per §6/§7) before copying in a single byte of any string.
        let mut argv_ptrs = Vec::new();
        let mut slot = argv_uaddr;
        loop {
            let ptr = self.mem.copyin_ptr(slot)?;
            if ptr == 0 {
                break;
            }
            if argv_ptrs.len() >= MAX_ARGS {
                return Err(Errno::TooBig);
            }
            argv_ptrs.push(ptr);
            slot += 8;
        }

        // Step 2: now that the count is known-good, copy each argument
        // string into its own kernel buffer.
        let mut argv = Vec::with_capacity(argv_ptrs.len());
        for ptr in argv_ptrs {
            argv.push(self.mem.copyin_str(ptr, PATH_MAX)?);
        }

        let file = self.vfs.open(&path)?;
        let mut new_as = AddressSpace::create();
        let entry = match self.vfs.load_elf(file, &mut new_as) {
            Ok(entry) => entry,
            Err(e) => {
                self.vfs.close(file);
                return Err(e);
            }
        };
        self.vfs.close(file);

        if let Err(e) = new_as.prepare_load() {
            // Any runs allocated before the failure are still live; the
            // address space contract says the caller must destroy them.
            new_as.destroy();
            return Err(e);
        }
        new_as.complete_load();

        let user_sp = match self.layout_argv(&new_as, &argv) {
            Ok(sp) => sp,
            Err(e) => {
                new_as.destroy();
                return Err(e);
            }
        };

        let old_as = caller.addrspace.lock().replace(new_as);
        if let Some(old_as) = old_as {
            old_as.destroy();
        }

        Ok(TrapFrame {
            entry_point: entry,
            user_sp,
        })
    }

    /// Write `argv`'s strings onto the top of `aspace`'s stack, packed
    /// tight (no per-slot padding to `PATH_MAX`), followed by a NUL-terminated
    /// pointer array. Returns the stack pointer the new process should start
    /// with.
    fn layout_argv(&self, aspace: &AddressSpace, argv: &[alloc::string::String]) -> Result<u64, Errno> {
        let mut sp = aspace.define_stack().as_u64();

        let mut ptrs = Vec::with_capacity(argv.len());
        for arg in argv.iter().rev() {
            let written = self.mem.copyout_str(sp - (arg.len() as u64 + 1), arg)?;
            sp -= written as u64;
            ptrs.push(sp);
        }
        ptrs.reverse();

        sp &= !7u64; // word-align before the pointer array

        sp -= 8;
        self.mem.copyout(sp, &0u64.to_le_bytes())?; // argv[] NULL terminator

        for &p in ptrs.iter().rev() {
            sp -= 8;
            self.mem.copyout(sp, &p.to_le_bytes())?;
        }

        Ok(sp)
    }

    /// Terminate `caller` with `code`, waking anyone blocked in `waitpid` on
    /// it. Live children are orphaned; a child that already exited and will
    /// never be waited for (because its parent is exiting without having
    /// waited) is reaped immediately.
    pub fn exit(&self, caller: &Arc<Process>, code: i32) {
        let status = encode_exit_status(code);

        for child_pid in caller.children.lock().drain(..) {
            if let Some(child) = process::lookup(child_pid) {
                let already_dead = child.exit.with_lock(|s| !s.alive);
                if already_dead {
                    process::remove(child_pid);
                }
            }
        }

        caller.exit.with_lock(|s| {
            s.alive = false;
            s.status = status;
        });
        caller.exit.notify_all();

        if let Some(a) = caller.addrspace.lock().take() {
            a.destroy();
        }

        // Nobody will ever call waitpid on an init process, nor on a process
        // whose parent has already gone away or is itself a zombie awaiting
        // its own reap: in either case self-destruct now rather than leaving
        // a zombie table entry nothing will ever collect.
        let parent_gone = match process::lookup(caller.parent_pid) {
            None => true,
            Some(parent) => parent.exit.with_lock(|s| !s.alive),
        };
        if caller.parent_pid == 0 || parent_gone {
            process::remove(caller.pid);
        }

        printk!("process {} exited with status {}\n", caller.pid, status);
    }

    /// Block until `pid` (which must be one of `caller`'s children) exits,
    /// reap it, copy its encoded exit status out to `status_uptr`, and return
    /// its pid. `options` must be 0 (no wait flags are supported) and
    /// `status_uptr` must be non-NULL (spec §4.5 step 1 of waitpid, §7).
    pub fn waitpid(
        &self,
        caller: &Arc<Process>,
        pid: Pid,
        status_uptr: u64,
        options: i32,
    ) -> Result<Pid, Errno> {
        if options != 0 {
            return Err(Errno::Inval);
        }
        if status_uptr == 0 {
            return Err(Errno::Fault);
        }

        let child = process::lookup(pid).ok_or(Errno::Srch)?;
        if child.parent_pid != caller.pid {
            return Err(Errno::Child);
        }

        let status = child.exit.wait_until(|s| if s.alive { None } else { Some(s.status) });

        caller.children.lock().retain(|&p| p != pid);
        process::remove(pid);

        self.mem.copyout(status_uptr, &status.to_le_bytes())?;
        Ok(pid)
    }

    pub fn getpid(&self, caller: &Arc<Process>) -> Pid {
        caller.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::VirtAddr;
    use crate::config::PAGE_SIZE;
    use crate::frame_alloc;
    use crate::hal::test_support::{FailingThreads, FakeThreads, FakeUserMem, FakeVfs, RecordingThreads};
    use crate::ram;
    use crate::wait::WEXITSTATUS;
    use alloc::string::String;
    use std::time::Duration;

    fn blank_trapframe() -> TrapFrame {
        TrapFrame::default()
    }

    /// Write a NUL-terminated argv pointer array at `argv_uaddr`: each
    /// string in `args` is copied to its own slot starting at `strings_base`
    /// (spaced `stride` bytes apart), and `argv_uaddr` is filled with the
    /// pointers to those slots followed by a NULL terminator.
    fn write_argv(argv_uaddr: u64, strings_base: u64, stride: u64, args: &[&str]) {
        for (i, arg) in args.iter().enumerate() {
            let mut bytes = arg.as_bytes().to_vec();
            bytes.push(0);
            let str_addr = strings_base + i as u64 * stride;
            ram::write_bytes(crate::addr::PhysAddr::new(str_addr), &bytes).unwrap();
            ram::write_bytes(
                crate::addr::PhysAddr::new(argv_uaddr + i as u64 * 8),
                &str_addr.to_le_bytes(),
            )
            .unwrap();
        }
        ram::write_bytes(
            crate::addr::PhysAddr::new(argv_uaddr + args.len() as u64 * 8),
            &0u64.to_le_bytes(),
        )
        .unwrap();
    }

    fn booted(n_frames: usize, name: &str) -> Arc<Process> {
        process::reset_for_test();
        frame_alloc::reset_for_test(n_frames);
        let p = process::create(0, String::from(name)).unwrap();
        let mut a = AddressSpace::create();
        a.define_region(VirtAddr::new(0x0040_0000), PAGE_SIZE as u64, true, false, true)
            .unwrap();
        a.define_region(VirtAddr::new(0x0050_0000), PAGE_SIZE as u64, true, true, false)
            .unwrap();
        a.prepare_load().unwrap();
        a.complete_load();
        *p.addrspace.lock() = Some(a);
        p
    }

    fn syscalls() -> (FakeVfs, FakeThreads, FakeUserMem) {
        (FakeVfs::new(), FakeThreads, FakeUserMem)
    }

    #[test]
    fn fork_records_own_pid_as_child_parent_not_grandparent() {
        let grandparent = booted(64, "gp");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let parent_pid = sc.fork(&grandparent, &blank_trapframe()).unwrap();
        let parent = process::lookup(parent_pid).unwrap();

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        let child = process::lookup(child_pid).unwrap();

        assert_eq!(child.parent_pid, parent.pid);
        assert_ne!(child.parent_pid, grandparent.pid);
    }

    #[test]
    fn fork_gives_child_its_own_copied_address_space() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        let child = process::lookup(child_pid).unwrap();

        let parent_pbase = parent.addrspace.lock().as_ref().unwrap().translate(VirtAddr::new(0x0040_0000)).unwrap().0;
        let child_pbase = child.addrspace.lock().as_ref().unwrap().translate(VirtAddr::new(0x0040_0000)).unwrap().0;
        assert_ne!(parent_pbase.as_u64(), child_pbase.as_u64());
        assert!(parent.children.lock().contains(&child.pid));
    }

    #[test]
    fn fork_hands_the_new_thread_a_copy_of_the_callers_trapframe() {
        let parent = booted(64, "parent");
        let (vfs, mem) = (FakeVfs::new(), FakeUserMem);
        let threads = RecordingThreads::new();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let trapframe = TrapFrame {
            entry_point: 0x0040_1234,
            user_sp: 0x7fff_0000,
        };
        sc.fork(&parent, &trapframe).unwrap();

        let recorded = threads.last_frame.lock().unwrap().clone().unwrap();
        assert_eq!(recorded.entry_point, trapframe.entry_point);
        assert_eq!(recorded.user_sp, trapframe.user_sp);
    }

    #[test]
    fn failed_thread_creation_destroys_the_child_instead_of_leaking_it() {
        let parent = booted(64, "parent");
        let (vfs, mem) = (FakeVfs::new(), FakeUserMem);
        let sc = Syscalls { vfs: &vfs, threads: &FailingThreads, mem: &mem };

        let (_, free_before) = frame_alloc::stats().unwrap();
        let err = sc.fork(&parent, &blank_trapframe()).unwrap_err();
        assert_eq!(err, Errno::Nomem);

        let (_, free_after) = frame_alloc::stats().unwrap();
        assert_eq!(free_before, free_after, "child's frames must not leak");
        assert_eq!(process::len(), 1, "child's table entry must not leak");
        assert!(parent.children.lock().is_empty());
    }

    #[test]
    fn waitpid_blocks_until_child_exits_and_reaps_it() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        let child = process::lookup(child_pid).unwrap();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let (vfs, threads, mem) = (FakeVfs::new(), FakeThreads, FakeUserMem);
            let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };
            sc.exit(&child, 7);
        });

        let status_uptr = 0x2000;
        let pid = sc.waitpid(&parent, child_pid, status_uptr, 0).unwrap();
        handle.join().unwrap();

        let status_bytes = ram::read_bytes(crate::addr::PhysAddr::new(status_uptr), 4).unwrap();
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&status_bytes);
        let status = i32::from_le_bytes(raw);

        assert_eq!(pid, child_pid);
        assert_eq!(WEXITSTATUS(status), 7);
        assert!(process::lookup(child_pid).is_none());
        assert!(parent.children.lock().is_empty());
    }

    #[test]
    fn waitpid_rejects_nonzero_options_without_touching_the_child() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        assert_eq!(sc.waitpid(&parent, child_pid, 0x2000, 1).unwrap_err(), Errno::Inval);
        assert!(process::lookup(child_pid).is_some(), "rejected call must not reap the child");
    }

    #[test]
    fn waitpid_rejects_a_null_status_pointer() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        assert_eq!(sc.waitpid(&parent, child_pid, 0, 0).unwrap_err(), Errno::Fault);
        assert!(process::lookup(child_pid).is_some(), "rejected call must not reap the child");
    }

    #[test]
    fn waitpid_on_unknown_pid_is_esrch() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };
        assert_eq!(sc.waitpid(&parent, 999, 0x2000, 0).unwrap_err(), Errno::Srch);
    }

    #[test]
    fn waitpid_on_a_non_child_is_echild() {
        let a = booted(64, "a");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };
        let b_pid = sc.fork(&a, &blank_trapframe()).unwrap();

        let stranger = process::create(0, String::from("stranger")).unwrap();
        assert_eq!(sc.waitpid(&stranger, b_pid, 0x2000, 0).unwrap_err(), Errno::Child);
    }

    #[test]
    fn orphaned_zombie_is_reaped_when_its_parent_exits_unwaited() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        let child = process::lookup(child_pid).unwrap();
        sc.exit(&child, 0); // child becomes a zombie; parent never waits

        assert!(process::lookup(child_pid).is_some());
        sc.exit(&parent, 0); // parent exits without reaping -> orphaned zombie is collected
        assert!(process::lookup(child_pid).is_none());
    }

    #[test]
    fn grandchild_self_destructs_when_its_own_parent_is_a_dead_unreaped_zombie() {
        let grandparent = booted(64, "gp");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let parent_pid = sc.fork(&grandparent, &blank_trapframe()).unwrap();
        let parent = process::lookup(parent_pid).unwrap();
        let child_pid = sc.fork(&parent, &blank_trapframe()).unwrap();
        let child = process::lookup(child_pid).unwrap();

        // Parent exits without anyone ever waiting for it: grandparent never
        // calls waitpid(parent_pid), so parent becomes a zombie that stays
        // in the table (its own parent, grandparent, is alive and reachable).
        sc.exit(&parent, 0);
        assert!(process::lookup(parent_pid).is_some(), "unreaped parent remains a zombie");

        // Child exits next. Its parent is present in the table but DEAD, not
        // merely absent -- it must still be treated as orphaned and
        // self-destruct, rather than leaking forever as an uncollectable
        // zombie.
        sc.exit(&child, 3);
        assert!(process::lookup(child_pid).is_none(), "orphan must not leak as a permanent zombie");
    }

    #[test]
    fn getpid_returns_the_callers_own_pid() {
        let parent = booted(64, "parent");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };
        assert_eq!(sc.getpid(&parent), parent.pid);
    }

    #[test]
    fn exec_replaces_address_space_and_lays_out_argv_on_the_stack() {
        let caller = booted(64, "caller");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let old_pbase = caller
            .addrspace
            .lock()
            .as_ref()
            .unwrap()
            .translate(VirtAddr::new(0x0040_0000))
            .unwrap()
            .0;
        let (_, free_before_exec) = frame_alloc::stats().unwrap();

        let path_uaddr = 0x2000;
        ram::write_bytes(crate::addr::PhysAddr::new(path_uaddr), b"/bin/child\0").unwrap();
        let argv_uaddr = 0x3000;
        write_argv(argv_uaddr, 0x4000, 64, &["hello", "world"]);

        let frame = sc.exec(&caller, path_uaddr, argv_uaddr).unwrap();
        assert!(frame.user_sp < crate::config::USERSTACK);
        assert_eq!(frame.user_sp % 8, 0);

        let new_pbase = caller
            .addrspace
            .lock()
            .as_ref()
            .unwrap()
            .translate(VirtAddr::new(0x0040_0000))
            .unwrap()
            .0;
        assert_ne!(new_pbase.as_u64(), old_pbase.as_u64());

        // Old address space's frames were freed, new one's were allocated:
        // net frame usage should be unchanged (same two regions + stack).
        let (_, free_after_exec) = frame_alloc::stats().unwrap();
        assert_eq!(free_before_exec, free_after_exec);
    }

    #[test]
    fn exec_with_too_many_args_returns_e2big_without_touching_caller() {
        let caller = booted(64, "caller");
        let (vfs, threads, mem) = syscalls();
        let sc = Syscalls { vfs: &vfs, threads: &threads, mem: &mem };

        let old_pbase = caller
            .addrspace
            .lock()
            .as_ref()
            .unwrap()
            .translate(VirtAddr::new(0x0040_0000))
            .unwrap()
            .0;

        let path_uaddr = 0x2000;
        ram::write_bytes(crate::addr::PhysAddr::new(path_uaddr), b"/bin/child\0").unwrap();
        let many_args: Vec<alloc::string::String> = (0..(MAX_ARGS + 1))
            .map(|i| alloc::format!("a{}", i))
            .collect();
        let many_args: Vec<&str> = many_args.iter().map(alloc::string::String::as_str).collect();
        let argv_uaddr = 0x3000;
        write_argv(argv_uaddr, 0x4000, 64, &many_args);

        let err = sc.exec(&caller, path_uaddr, argv_uaddr).unwrap_err();
        assert_eq!(err, Errno::TooBig);

        let new_pbase = caller
            .addrspace
            .lock()
            .as_ref()
            .unwrap()
            .translate(VirtAddr::new(0x0040_0000))
            .unwrap()
            .0;
        assert_eq!(new_pbase.as_u64(), old_pbase.as_u64(), "caller's address space must be untouched on failure");
    }
}
