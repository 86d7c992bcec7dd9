//! Deferred completion notices.
//!
//! The SIGCHLD handler is the only producer and the prompt loop the only
//! consumer, so the queue is a single-producer/single-consumer ring over
//! pre-allocated atomic slots. Pushing never allocates, locks or formats;
//! text is produced on the draining side.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use nix::unistd::Pid;

use crate::command::LastStatus;

/// A background child that was reaped, with the pid captured at reap time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapEvent {
    pub pid: Pid,
    pub outcome: LastStatus,
}

const SIGNALED_BIT: u64 = 1 << 31;
const CODE_MASK: u64 = 0x7fff_ffff;

impl ReapEvent {
    /// Packs the event into one word: pid in the high half, a signaled flag
    /// and the exit code or signal number in the low half. Never zero for a
    /// valid pid.
    pub fn pack(self) -> u64 {
        let low = match self.outcome {
            LastStatus::Exited(code) => code as u64 & CODE_MASK,
            LastStatus::Signaled(signal) => SIGNALED_BIT | (signal as u64 & CODE_MASK),
        };
        ((self.pid.as_raw() as u32 as u64) << 32) | low
    }

    pub fn unpack(word: u64) -> Self {
        let pid = Pid::from_raw((word >> 32) as u32 as i32);
        let code = (word & CODE_MASK) as i32;
        let outcome = if word & SIGNALED_BIT != 0 {
            LastStatus::Signaled(code)
        } else {
            LastStatus::Exited(code)
        };
        Self { pid, outcome }
    }
}

impl fmt::Display for ReapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.pid, self.outcome)
    }
}

/// Bounded FIFO of [`ReapEvent`]s.
///
/// When the ring is full the newest event is dropped and counted, so what is
/// kept stays in completion order.
pub struct NotificationQueue {
    slots: Box<[AtomicU64]>,
    /// Total events consumed; written by the consumer only.
    head: AtomicUsize,
    /// Total events published; written by the producer only.
    tail: AtomicUsize,
    dropped: AtomicUsize,
}

impl NotificationQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends an event. Async-signal-safe.
    ///
    /// Returns false if the queue was full and the event was discarded.
    pub fn push(&self, event: ReapEvent) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if self.slots.is_empty() || tail.wrapping_sub(head) >= self.slots.len() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.slots[tail % self.slots.len()].store(event.pack(), Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Number of events waiting to be drained.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every published event, oldest first.
    pub fn drain(&self) -> Vec<ReapEvent> {
        let mut head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let mut events = Vec::with_capacity(tail.wrapping_sub(head));
        while head != tail {
            let word = self.slots[head % self.slots.len()].load(Ordering::Relaxed);
            events.push(ReapEvent::unpack(word));
            head = head.wrapping_add(1);
        }
        self.head.store(head, Ordering::Release);
        events
    }

    /// Returns and resets the number of events discarded since the last call.
    pub fn take_dropped(&self) -> usize {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(pid: i32, code: i32) -> ReapEvent {
        ReapEvent {
            pid: Pid::from_raw(pid),
            outcome: LastStatus::Exited(code),
        }
    }

    fn signaled(pid: i32, signal: i32) -> ReapEvent {
        ReapEvent {
            pid: Pid::from_raw(pid),
            outcome: LastStatus::Signaled(signal),
        }
    }

    #[test]
    fn test_event_messages() {
        assert_eq!(
            exited(4242, 0).to_string(),
            "background pid 4242 is done: exit value 0"
        );
        assert_eq!(
            signaled(4243, 15).to_string(),
            "background pid 4243 is done: terminated by signal 15"
        );
    }

    #[test]
    fn test_packing_keeps_pid_and_outcome() {
        for event in [exited(1, 0), exited(i32::MAX, 255), signaled(77, 9)] {
            assert_ne!(event.pack(), 0);
            assert_eq!(ReapEvent::unpack(event.pack()), event);
        }
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let queue = NotificationQueue::with_capacity(4);
        assert!(queue.push(exited(1, 0)));
        assert!(queue.push(signaled(2, 9)));
        assert!(queue.push(exited(3, 1)));
        assert_eq!(queue.len(), 3);

        assert_eq!(
            queue.drain(),
            vec![exited(1, 0), signaled(2, 9), exited(3, 1)]
        );
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let queue = NotificationQueue::with_capacity(2);
        assert!(queue.push(exited(1, 0)));
        assert!(queue.push(exited(2, 0)));
        assert!(!queue.push(exited(3, 0)));
        assert!(!queue.push(exited(4, 0)));

        assert_eq!(queue.take_dropped(), 2);
        assert_eq!(queue.take_dropped(), 0);
        assert_eq!(queue.drain(), vec![exited(1, 0), exited(2, 0)]);
    }

    #[test]
    fn test_ring_wraps_around() {
        let queue = NotificationQueue::with_capacity(3);
        for round in 0..5 {
            let base = round * 10;
            assert!(queue.push(exited(base + 1, 0)));
            assert!(queue.push(exited(base + 2, 0)));
            assert_eq!(queue.drain(), vec![exited(base + 1, 0), exited(base + 2, 0)]);
        }
    }

    #[test]
    fn test_concurrent_producer_loses_nothing_below_capacity() {
        use std::sync::Arc;

        let queue = Arc::new(NotificationQueue::with_capacity(8));
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut next = 1;
                while next <= 200 {
                    if queue.push(exited(next, 0)) {
                        next += 1;
                    } else {
                        queue.take_dropped();
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 200 {
            seen.extend(queue.drain().into_iter().map(|e| e.pid.as_raw()));
        }
        producer.join().unwrap();
        assert_eq!(seen, (1..=200).collect::<Vec<_>>());
    }
}
