//! The process table and process object. Spec §4.4.
//!
//! The teacher's own `process/mod.rs` models a process as a `Continuation` —
//! a boxed closure handed to a cooperative scheduler — which has no notion
//! of pid, parent, or exit status at all. None of that survives here: what's
//! kept is the teacher's idiom of a single lock-guarded static
//! (`process/sched.rs`'s `static SCHEDULER: Mutex<Option<Scheduler>>`)
//! generalized to the spec's process table.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::addrspace::AddressSpace;
use crate::config::MAX_PROCESSES;
use crate::errno::Errno;
use crate::hal::Pid;
use crate::sync::{Monitor, SpinLock};

/// What a zombie process leaves behind until its parent reaps it.
#[derive(Debug, Clone, Copy)]
pub struct ExitState {
    pub alive: bool,
    pub status: i32,
}

pub struct Process {
    pub pid: Pid,
    pub parent_pid: Pid,
    pub name: String,
    pub addrspace: SpinLock<Option<AddressSpace>>,
    pub children: SpinLock<Vec<Pid>>,
    /// Guards (alive, exit status) and is the condition `waitpid` blocks on.
    pub exit: Monitor<ExitState>,
}

impl Process {
    fn new(pid: Pid, parent_pid: Pid, name: String) -> Self {
        Process {
            pid,
            parent_pid,
            name,
            addrspace: SpinLock::new(None),
            children: SpinLock::new(Vec::new()),
            exit: Monitor::new(ExitState {
                alive: true,
                status: 0,
            }),
        }
    }
}

struct Table {
    procs: BTreeMap<Pid, Arc<Process>>,
    next_pid: Pid,
    /// Pids returned by `table_remove`, reused before any fresh pid is
    /// minted (spec §3/§4.4: "assigns the smallest unused pid, reusing pids
    /// from an explicit free list when non-empty").
    free_pids: Vec<Pid>,
}

impl Table {
    fn alloc_pid(&mut self) -> Result<Pid, Errno> {
        if self.procs.len() >= MAX_PROCESSES {
            return Err(Errno::NProc);
        }
        if !self.free_pids.is_empty() {
            // table_insert assigns the smallest unused pid (spec §4.4): the
            // free list isn't necessarily sorted by removal order, so pick
            // its minimum rather than treating it as a plain stack.
            let (idx, _) = self
                .free_pids
                .iter()
                .enumerate()
                .min_by_key(|&(_, &pid)| pid)
                .unwrap();
            return Ok(self.free_pids.remove(idx));
        }
        // Free list is empty: mint a fresh pid. Linear probe from
        // `next_pid`, wrapping -- the table is never more than
        // `MAX_PROCESSES` entries, so this always terminates.
        let start = self.next_pid;
        loop {
            let candidate = self.next_pid;
            self.next_pid = self.next_pid.wrapping_add(1).max(1);
            if !self.procs.contains_key(&candidate) && candidate != 0 {
                return Ok(candidate);
            }
            if self.next_pid == start {
                return Err(Errno::NProc);
            }
        }
    }
}

static TABLE: SpinLock<Table> = SpinLock::new(Table {
    procs: BTreeMap::new(),
    next_pid: 1,
    free_pids: Vec::new(),
});

/// Create a fresh process table entry with no address space yet installed.
/// `ENPROC` if the table is at capacity (spec §4.5 step 1 of fork).
pub fn create(parent_pid: Pid, name: String) -> Result<Arc<Process>, Errno> {
    let mut table = TABLE.lock();
    let pid = table.alloc_pid()?;
    let proc = Arc::new(Process::new(pid, parent_pid, name));
    table.procs.insert(pid, proc.clone());
    printk!("process {} created (parent {})\n", pid, parent_pid);
    Ok(proc)
}

pub fn lookup(pid: Pid) -> Option<Arc<Process>> {
    TABLE.lock().procs.get(&pid).cloned()
}

/// Remove a process from the table entirely. Called once its exit status has
/// been reaped by its parent (or the process was never waited for and has
/// been reparented to nobody, per spec §4.5's orphan-reaping note).
pub fn remove(pid: Pid) {
    let mut table = TABLE.lock();
    table.procs.remove(&pid);
    table.free_pids.push(pid);
    printk!("process {} removed from table\n", pid);
}

pub fn len() -> usize {
    TABLE.lock().procs.len()
}

#[cfg(test)]
pub fn reset_for_test() {
    let mut table = TABLE.lock();
    table.procs.clear();
    table.next_pid = 1;
    table.free_pids.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_distinct_pids_and_records_parent() {
        reset_for_test();
        let p1 = create(0, String::from("init")).unwrap();
        let p2 = create(p1.pid, String::from("child")).unwrap();
        assert_ne!(p1.pid, p2.pid);
        assert_eq!(p2.parent_pid, p1.pid);
    }

    #[test]
    fn table_is_full_at_max_processes_and_enforces_enproc() {
        reset_for_test();
        for i in 0..MAX_PROCESSES {
            create(0, String::from("p")).unwrap_or_else(|e| panic!("{} at {}", e, i));
        }
        assert_eq!(len(), MAX_PROCESSES);
        assert_eq!(create(0, String::from("overflow")).unwrap_err(), Errno::NProc);
    }

    #[test]
    fn lookup_finds_live_process_and_none_after_remove() {
        reset_for_test();
        let p = create(0, String::from("x")).unwrap();
        assert!(lookup(p.pid).is_some());
        remove(p.pid);
        assert!(lookup(p.pid).is_none());
    }

    #[test]
    fn freed_pid_can_be_reused_after_table_fills_and_drains() {
        reset_for_test();
        let mut pids = Vec::new();
        for _ in 0..MAX_PROCESSES {
            pids.push(create(0, String::from("p")).unwrap().pid);
        }
        assert_eq!(create(0, String::from("overflow")).unwrap_err(), Errno::NProc);

        remove(pids[0]);
        let reused = create(0, String::from("new")).unwrap();
        assert_eq!(reused.pid, pids[0], "a freed pid must actually be handed back out");
    }

    #[test]
    fn removed_pid_is_recycled_by_the_very_next_create() {
        reset_for_test();
        let p1 = create(0, String::from("a")).unwrap();
        let p1_pid = p1.pid;
        remove(p1_pid);
        let p2 = create(0, String::from("b")).unwrap();
        assert_eq!(p2.pid, p1_pid, "next_pid must not just keep incrementing past a freed pid");
    }

    #[test]
    fn free_list_hands_back_the_smallest_freed_pid_first() {
        reset_for_test();
        let a = create(0, String::from("a")).unwrap().pid;
        let b = create(0, String::from("b")).unwrap().pid;
        let c = create(0, String::from("c")).unwrap().pid;
        remove(c);
        remove(a);
        remove(b);
        let first = create(0, String::from("x")).unwrap().pid;
        assert_eq!(first, a.min(b).min(c));
    }

    #[test]
    fn exit_state_starts_alive_with_zero_status() {
        reset_for_test();
        let p = create(0, String::from("x")).unwrap();
        p.exit.with_lock(|s| {
            assert!(s.alive);
            assert_eq!(s.status, 0);
        });
    }
}
