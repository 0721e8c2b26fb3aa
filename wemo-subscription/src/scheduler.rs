//! Deadline-ordered, cancellable timer queue.
//!
//! Pure data structure: the registry's scheduler thread drives it under the
//! shared lock, so it needs no synchronization of its own. Cancellation is
//! lazy; a cancelled entry stays in the heap until its deadline surfaces and
//! is skipped then.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Handle to one pending timer entry.
///
/// Ids are never reused within a queue, so cancelling a handle whose entry
/// already fired is a safe no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Deadline-ordered queue of pending jobs.
pub struct TimerQueue<T> {
    // Entries with equal deadlines fire in scheduling order; the monotonic
    // id doubles as the tiebreaker.
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    jobs: HashMap<u64, T>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            jobs: HashMap::new(),
            next_id: 0,
        }
    }

    /// Queue `job` to fire after `delay`, returning its cancellation handle.
    pub fn schedule(&mut self, delay: Duration, job: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((Instant::now() + delay, id)));
        self.jobs.insert(id, job);
        TimerId(id)
    }

    /// Drop a pending entry. Unknown or already-fired handles are ignored.
    pub fn cancel(&mut self, id: TimerId) {
        self.jobs.remove(&id.0);
    }

    /// Remove and return the next entry whose deadline has passed.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        while let Some(&Reverse((deadline, id))) = self.heap.peek() {
            if deadline > now {
                return None;
            }
            self.heap.pop();
            if let Some(job) = self.jobs.remove(&id) {
                return Some(job);
            }
            // cancelled entry, keep draining
        }
        None
    }

    /// Deadline of the nearest live entry.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(&Reverse((deadline, id))) = self.heap.peek() {
            if self.jobs.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Drop every pending entry.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.jobs.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
