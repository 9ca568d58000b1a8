//! Delayed task scheduling
//!
//! The registry never blocks or sleeps. Anything that must happen later
//! (siege checkups, re-securing doors, trapped-player rescue) is handed to a
//! [`Scheduler`] with a delay in ticks, and the host drives time forward.

use crate::time::Tick;
use serde::{Deserialize, Serialize};

/// Handle returned by [`Scheduler::schedule`], used to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub u64);

/// Host-provided delayed execution
pub trait Scheduler<T>: Send {
    /// Run `task` after `delay` ticks
    fn schedule(&mut self, delay: Tick, task: T) -> TaskHandle;

    /// Drop a pending task. Returns false if it already ran or never existed.
    fn cancel(&mut self, handle: TaskHandle) -> bool;

    /// Move time forward and collect tasks that came due, in due order
    fn advance(&mut self, ticks: Tick) -> Vec<T>;

    /// Number of pending tasks
    fn pending(&self) -> usize;
}

/// In-process tick scheduler
///
/// Tasks are kept sorted by due tick; ties run in scheduling order.
#[derive(Debug)]
pub struct TickScheduler<T> {
    current: Tick,
    next_handle: u64,
    queue: Vec<(Tick, TaskHandle, T)>,
}

impl<T> TickScheduler<T> {
    pub fn new() -> Self {
        Self {
            current: 0,
            next_handle: 1,
            queue: Vec::new(),
        }
    }

    /// Current tick
    pub fn now(&self) -> Tick {
        self.current
    }

    /// Iterate pending tasks with their due ticks
    pub fn iter(&self) -> impl Iterator<Item = (Tick, &T)> {
        self.queue.iter().map(|(tick, _, task)| (*tick, task))
    }
}

impl<T> Default for TickScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Scheduler<T> for TickScheduler<T> {
    fn schedule(&mut self, delay: Tick, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let due = self.current + delay;
        // Stable position after every task due at or before `due`
        let at = self.queue.partition_point(|(tick, _, _)| *tick <= due);
        self.queue.insert(at, (due, handle, task));
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.queue.iter().position(|(_, h, _)| *h == handle) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    fn advance(&mut self, ticks: Tick) -> Vec<T> {
        self.current += ticks;
        let split = self.queue.partition_point(|(tick, _, _)| *tick <= self.current);
        self.queue.drain(..split).map(|(_, _, task)| task).collect()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
