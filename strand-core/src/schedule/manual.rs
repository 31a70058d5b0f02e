//! A scheduler driven by hand.
//!
//! Time only moves when the owner calls [`ManualScheduler::advance`] or
//! [`ManualScheduler::run_until_idle`], which makes flush and sweep timing
//! fully deterministic in tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use super::{Scheduler, Task};

/// Upper bound on ticks in one `run_until_idle` call.
const MAX_IDLE_TICKS: usize = 10_000;

#[derive(Default)]
struct Queue {
    now: Duration,
    seq: u64,
    /// Keyed by (due time, insertion order).
    tasks: BTreeMap<(Duration, u64), Task>,
}

/// A virtual-clock scheduler. Clones share the same queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<RefCell<Queue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.queue.borrow().now
    }

    /// Number of tasks not yet run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }

    /// Run every task that is due now and was queued before this call.
    ///
    /// Tasks queued while the tick runs wait for the next tick, even with a
    /// zero delay. Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        let (now, horizon) = {
            let queue = self.queue.borrow();
            (queue.now, queue.seq)
        };

        let mut ran = 0;
        loop {
            // The borrow must end before the task runs; tasks schedule more work.
            let next = {
                let mut queue = self.queue.borrow_mut();
                let key = queue
                    .tasks
                    .keys()
                    .find(|(due, seq)| *due <= now && *seq < horizon)
                    .copied();
                key.and_then(|key| queue.tasks.remove(&key))
            };
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the clock forward by `by`, running ticks at every due time passed.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = self.tick();

        while let Some(due) = self.next_due().filter(|due| *due <= target) {
            self.queue.borrow_mut().now = due;
            let step = self.tick();
            ran += step;
            if step == 0 {
                break;
            }
        }

        self.queue.borrow_mut().now = target;
        ran + self.tick()
    }

    /// Keep jumping to the next due time and ticking until the queue is empty.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        for _ in 0..MAX_IDLE_TICKS {
            let Some(due) = self.next_due() else {
                return ran;
            };
            {
                let mut queue = self.queue.borrow_mut();
                if due > queue.now {
                    queue.now = due;
                }
            }
            ran += self.tick();
        }
        tracing::warn!(ticks = MAX_IDLE_TICKS, "manual scheduler still busy, giving up");
        ran
    }

    fn next_due(&self) -> Option<Duration> {
        self.queue.borrow().tasks.keys().next().map(|(due, _)| *due)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut queue = self.queue.borrow_mut();
        let due = queue.now + delay;
        let seq = queue.seq;
        queue.seq += 1;
        queue.tasks.insert((due, seq), task);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
