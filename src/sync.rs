//! Locking primitives.
//!
//! Spec §5 assumes a spinlock, a mutex, and a condition variable are simply
//! available with standard semantics, supplied by a lower layer this crate
//! does not implement. `SpinLock` is that spinlock (the teacher's `spin`
//! crate, used the same way throughout `memory/paging/mod.rs` and
//! `process/sched.rs`). `Monitor` stands in for the mutex+condvar pair: a
//! spin-retry wait loop keyed by a generation counter rather than a true
//! blocking wait, since the scheduler that would park and wake a thread is
//! itself one of the out-of-scope collaborators. It is still race-free: a
//! notification that lands between the predicate check and the wait either
//! is observed as a generation bump (woken immediately) or hasn't happened
//! yet (and the waiter loops to check again) — see `Monitor::wait_until`.

use core::sync::atomic::{AtomicU64, Ordering};

pub use spin::Mutex as SpinLock;
pub use spin::MutexGuard as SpinLockGuard;

/// A mutex guarding `T`, paired with a broadcast-only condition variable.
pub struct Monitor<T> {
    state: SpinLock<T>,
    generation: AtomicU64,
}

impl<T> Monitor<T> {
    pub const fn new(value: T) -> Self {
        Monitor {
            state: SpinLock::new(value),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `f` under the lock. Used for simple reads/writes that don't need
    /// to wait on a condition.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Repeatedly lock and call `f`, retrying until it returns `Some`.
    /// Mirrors `while !cond { cv_wait(cv, lock) }` followed by the action
    /// that was waiting on `cond`.
    pub fn wait_until<R>(&self, mut f: impl FnMut(&mut T) -> Option<R>) -> R {
        loop {
            let gen_before = self.generation.load(Ordering::SeqCst);

            if let Some(result) = f(&mut self.state.lock()) {
                return result;
            }

            while self.generation.load(Ordering::SeqCst) == gen_before {
                core::hint::spin_loop();
            }
        }
    }

    /// Wake every waiter so it re-checks its predicate.
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
