//! Virtual-time task queue standing in for the page's event loop.
//!
//! Nothing here sleeps. Time only moves through [`Scheduler::advance_to`]; tasks due at the
//! same instant run in the order they were scheduled.

use std::collections::BTreeMap;

/// Delay between activation and injection, so the loading indicator is perceivable.
pub const INJECT_DELAY_MS: u64 = 150;

#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: u64,
    seq: u64,
    queue: BTreeMap<(u64, u64), T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: 0,
            seq: 0,
            queue: BTreeMap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn schedule(&mut self, delay_ms: u64, task: T) {
        let due = self.now.saturating_add(delay_ms);
        self.queue.insert((due, self.seq), task);
        self.seq += 1;
    }

    /// When the next task is due, if any.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Pops the earliest task due at or before `deadline`, moving the clock to its due time.
    pub fn pop_due(&mut self, deadline: u64) -> Option<T> {
        let (&(due, _), _) = self.queue.first_key_value()?;
        if due > deadline {
            return None;
        }
        let ((due, _), task) = self.queue.pop_first()?;
        self.now = self.now.max(due);
        Some(task)
    }

    /// Moves the clock forward to `deadline` once no earlier task remains.
    pub fn advance_to(&mut self, deadline: u64) {
        self.now = self.now.max(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_due_then_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule(150, "b");
        s.schedule(10, "a");
        s.schedule(150, "c");
        assert_eq!(s.next_due(), Some(10));

        assert_eq!(s.pop_due(100), Some("a"));
        assert_eq!(s.now(), 10);
        assert_eq!(s.pop_due(100), None);
        assert_eq!(s.now(), 10);

        assert_eq!(s.pop_due(u64::MAX), Some("b"));
        assert_eq!(s.pop_due(u64::MAX), Some("c"));
        assert_eq!(s.now(), 150);
        assert!(s.is_idle());
    }

    #[test]
    fn delays_are_relative_to_the_current_time() {
        let mut s = Scheduler::new();
        s.advance_to(1_000);
        s.schedule(INJECT_DELAY_MS, ());
        assert_eq!(s.next_due(), Some(1_150));
    }
}
