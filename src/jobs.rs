//! Fixed-capacity registry of background process ids.
//!
//! Every slot is an atomic so that the SIGCHLD handler can clear entries
//! while the prompt loop is anywhere, including in the middle of an insert.
//! The table never grows after construction.

use std::sync::atomic::{AtomicI32, Ordering};

use nix::unistd::Pid;

/// Value of an empty slot. Never a valid child pid.
pub const NO_JOB: i32 = 0;

pub struct JobTable {
    slots: Box<[AtomicI32]>,
}

impl JobTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicI32::new(NO_JOB)).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stores `pid` in the first empty slot.
    ///
    /// Returns false when the table is full; the job then runs untracked.
    pub fn insert(&self, pid: Pid) -> bool {
        let raw = pid.as_raw();
        if raw <= NO_JOB {
            return false;
        }
        self.slots.iter().any(|slot| {
            slot.compare_exchange(NO_JOB, raw, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Clears the slot holding `pid`. Safe to call from a signal handler.
    pub fn remove(&self, pid: Pid) -> bool {
        let raw = pid.as_raw();
        if raw <= NO_JOB {
            return false;
        }
        self.slots.iter().any(|slot| {
            slot.compare_exchange(raw, NO_JOB, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    #[cfg(test)]
    fn contains(&self, pid: Pid) -> bool {
        let raw = pid.as_raw();
        raw > NO_JOB && self.slots.iter().any(|slot| slot.load(Ordering::Acquire) == raw)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.load(Ordering::Acquire) != NO_JOB)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the table, returning the pids that were tracked.
    pub fn take_all(&self) -> Vec<Pid> {
        self.slots
            .iter()
            .map(|slot| slot.swap(NO_JOB, Ordering::AcqRel))
            .filter(|raw| *raw != NO_JOB)
            .map(Pid::from_raw)
            .collect()
    }
}
