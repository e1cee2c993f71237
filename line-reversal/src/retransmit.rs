//! Retransmission timers for outbound DATA chunks.
//!
//! Every DATA chunk we send is tracked by a [`RetransmitTask`] until the peer
//! acknowledges it.  Tasks live in a table keyed by [`TaskId`]; their
//! deadlines live in a min-heap.  The queue holds no references to sessions:
//! when a deadline passes, the engine re-reads the session from its store and
//! decides whether to resend, cancel, or give up on the peer.
//!
//! Cancelling a task only removes it from the table.  Its heap entry goes
//! stale and is skipped when it surfaces.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Retransmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitConfig {
    /// Delay between consecutive transmissions of one chunk.
    pub interval: Duration,
    /// Transmissions allowed per chunk before the peer is presumed gone.
    pub max_attempts: u32,
}

impl Default for RetransmitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 20,
        }
    }
}

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// One DATA chunk awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitTask {
    /// Session the chunk belongs to.
    pub session: u32,
    /// Encoded DATA message, resent byte for byte.
    pub frame: Vec<u8>,
    /// Output offset just past the chunk; an ACK at or beyond it retires the task.
    pub end_offset: usize,
    /// Transmissions so far (1 after the initial send).
    pub attempts: u32,
}

/// What the engine should do with a task whose deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Session gone or chunk acknowledged: drop silently.
    Cancel,
    /// Attempt budget spent: the peer is presumed unreachable.
    Exhausted,
    /// Send the frame again and reschedule.
    Resend,
}

/// Table of pending retransmissions plus their deadlines.
#[derive(Debug)]
pub struct RetransmitQueue {
    config: RetransmitConfig,
    tasks: HashMap<TaskId, RetransmitTask>,
    deadlines: BinaryHeap<Reverse<(Instant, TaskId)>>,
    next_id: u64,
}

impl RetransmitQueue {
    pub fn new(config: RetransmitConfig) -> Self {
        Self {
            config,
            tasks: HashMap::new(),
            deadlines: BinaryHeap::new(),
            next_id: 0,
        }
    }

    /// Track a chunk that was just transmitted for the first time.
    pub fn schedule(&mut self, session: u32, frame: Vec<u8>, end_offset: usize, now: Instant) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let task = RetransmitTask {
            session,
            frame,
            end_offset,
            attempts: 1,
        };
        self.reschedule(id, task, now);
        id
    }

    /// Put a task popped by [`pop_due`](Self::pop_due) back, one interval from `now`.
    pub fn reschedule(&mut self, id: TaskId, task: RetransmitTask, now: Instant) {
        self.deadlines.push(Reverse((now + self.config.interval, id)));
        self.tasks.insert(id, task);
    }

    /// Remove and return the earliest task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TaskId, RetransmitTask)> {
        while let Some(&Reverse((at, id))) = self.deadlines.peek() {
            if at > now {
                return None;
            }
            self.deadlines.pop();
            if let Some(task) = self.tasks.remove(&id) {
                return Some((id, task));
            }
            // Stale entry for a cancelled task.
        }
        None
    }

    /// Earliest live deadline, if any task is pending.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(&Reverse((at, id))) = self.deadlines.peek() {
            if self.tasks.contains_key(&id) {
                return Some(at);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Decide the fate of a due task given the session's current state.
    ///
    /// `bytes_acked` is `None` when the session no longer exists.
    pub fn verdict(&self, task: &RetransmitTask, bytes_acked: Option<usize>) -> Verdict {
        match bytes_acked {
            None => Verdict::Cancel,
            Some(acked) if acked >= task.end_offset => Verdict::Cancel,
            Some(_) if task.attempts >= self.config.max_attempts => Verdict::Exhausted,
            Some(_) => Verdict::Resend,
        }
    }

    /// Drop every task belonging to `session`.  Returns how many were dropped.
    pub fn cancel_session(&mut self, session: u32) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.session != session);
        before - self.tasks.len()
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for RetransmitQueue {
    fn default() -> Self {
        Self::new(RetransmitConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
