//! Timer queue
//!
//! Deadline-ordered queue of typed tasks. The engine never sleeps; the dispatch
//! loop asks for `next_deadline` and calls back once it has passed.

use core::cmp::Reverse;
use hashbrown::HashMap;
use std::collections::BinaryHeap;

use crate::types::{ChannelId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work the engine schedules for later
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTask {
    /// Encode and send the next part of a pending dictionary
    DictionaryPart { channel: ChannelId, pending: u64 },
}

impl ScheduledTask {
    pub fn channel(&self) -> ChannelId {
        match self {
            ScheduledTask::DictionaryPart { channel, .. } => *channel,
        }
    }
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(Timestamp, TimerId)>>,
    tasks: HashMap<TimerId, (Timestamp, T)>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, at: Timestamp, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse((at, id)));
        self.tasks.insert(id, (at, task));
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.tasks.remove(&id).map(|(_, task)| task)
    }

    /// Cancel every task matching `predicate`, returning how many were dropped
    pub fn cancel_where<F: Fn(&T) -> bool>(&mut self, predicate: F) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, (_, task)| !predicate(task));
        before - self.tasks.len()
    }

    /// Remove and return every task due at or before `now`, earliest first
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(Reverse((at, id))) = self.heap.peek().copied() {
            if at > now {
                break;
            }
            self.heap.pop();
            if let Some((_, task)) = self.tasks.remove(&id) {
                due.push(task);
            }
        }
        due
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        while let Some(Reverse((at, id))) = self.heap.peek().copied() {
            if self.tasks.contains_key(&id) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
