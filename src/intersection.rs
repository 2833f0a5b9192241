//! An intersection-monitor concurrency exemplar. Spec §4.6.
//!
//! Nothing in the teacher repo models a traffic intersection; this is
//! grounded on the teacher's own concurrency idiom instead (`cap.rs`'s
//! single lock-guarded registry, `sync.rs`'s `Monitor`) applied to the
//! admission predicate and selective-broadcast rule spec §4.6 specifies.

use alloc::vec::Vec;

use crate::sync::{Monitor, SpinLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dir {
    N,
    E,
    S,
    W,
}

impl Dir {
    fn opposite(self) -> Dir {
        match self {
            Dir::N => Dir::S,
            Dir::S => Dir::N,
            Dir::E => Dir::W,
            Dir::W => Dir::E,
        }
    }

    fn index(self) -> usize {
        match self {
            Dir::N => 0,
            Dir::E => 1,
            Dir::S => 2,
            Dir::W => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vehicle {
    pub origin: Dir,
    pub destination: Dir,
}

impl Vehicle {
    /// A right turn is one quarter-turn counter-clockwise from `origin`:
    /// exactly (W->S), (S->E), (E->N), (N->W).
    fn is_right_turn(self) -> bool {
        let cw = [Dir::N, Dir::E, Dir::S, Dir::W];
        cw[(self.origin.index() + 3) % 4] == self.destination
    }
}

/// Two vehicles may occupy the intersection simultaneously if their paths
/// cannot cross: same origin (they queue, never collide), opposite
/// directions (both going straight through or turning, paths don't cross),
/// or one is turning right into a destination the other isn't using.
pub fn compatible(a: Vehicle, b: Vehicle) -> bool {
    if a.origin == b.origin {
        return true;
    }
    if a.origin == b.destination && a.destination == b.origin {
        // opposite-direction through traffic
        return true;
    }
    if a.is_right_turn() || b.is_right_turn() {
        return a.destination != b.destination;
    }
    false
}

pub struct IntersectionMonitor {
    occupants: SpinLock<Vec<Vehicle>>,
    /// One generation counter per origin direction, so `after_exit` can wake
    /// only the origins whose admission predicate could plausibly have
    /// flipped, rather than every waiter.
    cv: [Monitor<()>; 4],
}

impl IntersectionMonitor {
    pub const fn new() -> Self {
        IntersectionMonitor {
            occupants: SpinLock::new(Vec::new()),
            cv: [Monitor::new(()), Monitor::new(()), Monitor::new(()), Monitor::new(())],
        }
    }

    /// Block until `vehicle` may safely enter, then record it as an
    /// occupant.
    pub fn before_entry(&self, vehicle: Vehicle) {
        self.cv[vehicle.origin.index()].wait_until(|_| {
            let occupants = self.occupants.lock();
            if occupants.iter().all(|&other| compatible(vehicle, other)) {
                drop(occupants);
                self.occupants.lock().push(vehicle);
                Some(())
            } else {
                None
            }
        });
        printk!("intersection: {:?} entered\n", vehicle);
    }

    /// Record `vehicle` as having left the intersection, then wake whichever
    /// origins might now be admissible.
    pub fn after_exit(&self, vehicle: Vehicle) {
        self.occupants.lock().retain(|&v| v != vehicle);
        printk!("intersection: {:?} exited\n", vehicle);

        // A newly-vacated path only ever unblocks vehicles waiting at the
        // two directions perpendicular to the one that just left: traffic
        // from the same or opposite origin was never blocked by this
        // vehicle's presence (see `compatible`), so there is nothing for
        // them to re-check.
        let (a, b) = match vehicle.origin {
            Dir::N | Dir::S => (Dir::E, Dir::W),
            Dir::E | Dir::W => (Dir::N, Dir::S),
        };
        self.cv[a.index()].notify_all();
        self.cv[b.index()].notify_all();
    }
}
