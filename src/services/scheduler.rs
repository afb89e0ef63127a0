// src/services/scheduler.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<(i64, String)>>,
    /// Current start time per quiz. Heap entries that disagree are stale.
    pending: HashMap<String, i64>,
}

/// Pending automatic starts, ordered by time.
///
/// Rescheduling or cancelling leaves the old heap entry in place; it is
/// discarded when it surfaces.
#[derive(Default)]
pub struct Scheduler {
    queue: Mutex<Queue>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn schedule(&self, quiz_id: &str, at: i64) {
        let mut queue = self.lock();
        queue.pending.insert(quiz_id.to_string(), at);
        queue.heap.push(Reverse((at, quiz_id.to_string())));
    }

    /// Returns whether a start was pending.
    pub fn cancel(&self, quiz_id: &str) -> bool {
        self.lock().pending.remove(quiz_id).is_some()
    }

    /// Removes and returns every start due at or before `now`, earliest first.
    pub fn due(&self, now: i64) -> Vec<(String, i64)> {
        let mut queue = self.lock();
        let mut due = Vec::new();
        while let Some(Reverse((at, _))) = queue.heap.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((at, id))) = queue.heap.pop() else {
                break;
            };
            if queue.pending.get(&id) == Some(&at) {
                queue.pending.remove(&id);
                due.push((id, at));
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
