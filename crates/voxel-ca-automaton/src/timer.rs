//! Hashed timer wheel for deferred actions.
//!
//! A task scheduled with delay `d` lands in bucket `(cursor + d) % size`.
//! Each [`TimerWheel::advance`] fires the bucket under the cursor and moves
//! the cursor forward by one, so the task fires on the `(d + 1)`-th advance
//! after scheduling. A delay of zero fires on the next advance.

use indexmap::IndexMap;

use crate::error::{AutomatonError, AutomatonResult};

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    bucket: usize,
    id: u64,
}

/// Fixed-size ring of task buckets.
#[derive(Debug, Clone)]
pub struct TimerWheel<T> {
    buckets: Vec<IndexMap<u64, T>>,
    cursor: usize,
    next_id: u64,
    len: usize,
}

impl<T> TimerWheel<T> {
    /// Create a wheel with `size` buckets (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            buckets: (0..size).map(|_| IndexMap::new()).collect(),
            cursor: 0,
            next_id: 0,
            len: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Schedule `task` to fire `delay` advances from now.
    pub fn schedule(&mut self, task: T, delay: u32) -> AutomatonResult<TaskHandle> {
        let size = self.buckets.len();
        if delay as usize >= size {
            return Err(AutomatonError::DelayOutOfRange {
                delay,
                wheel_size: size,
            });
        }
        let bucket = (self.cursor + delay as usize) % size;
        let id = self.next_id;
        self.next_id += 1;
        self.buckets[bucket].insert(id, task);
        self.len += 1;
        Ok(TaskHandle { bucket, id })
    }

    /// Cancel a pending task. Returns false if it already fired.
    pub fn cancel(&mut self, handle: &TaskHandle) -> bool {
        let removed = self
            .buckets
            .get_mut(handle.bucket)
            .and_then(|bucket| bucket.swap_remove(&handle.id))
            .is_some();
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Fire every task in the current bucket, then move the cursor.
    pub fn advance(&mut self, mut fire: impl FnMut(T)) -> usize {
        let due = std::mem::take(&mut self.buckets[self.cursor]);
        self.cursor = (self.cursor + 1) % self.buckets.len();
        let fired = due.len();
        self.len -= fired;
        for (_, task) in due {
            fire(task);
        }
        fired
    }

    /// Remove every pending task with the advances it still had to wait.
    pub fn drain_all(&mut self) -> Vec<(u32, T)> {
        let size = self.buckets.len();
        let cursor = self.cursor;
        let mut drained = Vec::with_capacity(self.len);
        for step in 0..size {
            let bucket = (cursor + step) % size;
            for (_, task) in std::mem::take(&mut self.buckets[bucket]) {
                drained.push((step as u32, task));
            }
        }
        self.len = 0;
        drained
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_collect(wheel: &mut TimerWheel<&'static str>) -> Vec<&'static str> {
        let mut fired = Vec::new();
        wheel.advance(|t| fired.push(t));
        fired
    }

    #[test]
    fn test_fires_after_delay() {
        let mut wheel = TimerWheel::new(8);
        wheel.schedule("a", 3).unwrap();
        wheel.schedule("now", 0).unwrap();
        assert_eq!(wheel.len(), 2);

        assert_eq!(advance_collect(&mut wheel), vec!["now"]);
        assert!(advance_collect(&mut wheel).is_empty());
        assert!(advance_collect(&mut wheel).is_empty());
        assert_eq!(advance_collect(&mut wheel), vec!["a"]);
        assert!(wheel.is_empty());
    }

    #[test]
    fn test_wraps_around() {
        let mut wheel = TimerWheel::new(4);
        for _ in 0..3 {
            advance_collect(&mut wheel);
        }
        wheel.schedule("late", 3).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(advance_collect(&mut wheel));
        }
        assert_eq!(seen, vec!["late"]);
    }

    #[test]
    fn test_rejects_long_delay() {
        let mut wheel: TimerWheel<()> = TimerWheel::new(4);
        assert!(matches!(
            wheel.schedule((), 4),
            Err(AutomatonError::DelayOutOfRange { delay: 4, wheel_size: 4 })
        ));
    }

    #[test]
    fn test_cancel() {
        let mut wheel = TimerWheel::new(4);
        let keep = wheel.schedule("keep", 1).unwrap();
        let drop = wheel.schedule("drop", 1).unwrap();
        assert!(wheel.cancel(&drop));
        assert!(!wheel.cancel(&drop));
        assert_eq!(wheel.len(), 1);

        advance_collect(&mut wheel);
        assert_eq!(advance_collect(&mut wheel), vec!["keep"]);
        assert!(!wheel.cancel(&keep));
    }

    #[test]
    fn test_drain_all_reports_remaining_delay() {
        let mut wheel = TimerWheel::new(8);
        advance_collect(&mut wheel);
        wheel.schedule("two", 2).unwrap();
        wheel.schedule("five", 5).unwrap();
        let mut drained = wheel.drain_all();
        drained.sort();
        assert_eq!(drained, vec![(2, "two"), (5, "five")]);
        assert!(wheel.is_empty());
    }
}
