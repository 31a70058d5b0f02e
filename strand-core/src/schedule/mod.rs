//! Deferred Work
//!
//! The engine never blocks. It defers exactly two kinds of work:
//!
//! - the batch flush, scheduled for the next tick after the first mutation in
//!   a coalescing round;
//! - the liveness sweep, scheduled a fixed delay after an effect is newly
//!   subscribed to a state.
//!
//! Both go through the [`Scheduler`] trait so the embedding event loop decides
//! what a "tick" is. [`ManualScheduler`] is a deterministic virtual clock for
//! tests and for embedders that pump their own loop; [`LocalScheduler`] runs
//! tasks on a tokio `LocalSet`.

mod local;
mod manual;

use std::time::Duration;

pub use local::LocalScheduler;
pub use manual::ManualScheduler;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Runs tasks after a delay.
///
/// A zero delay means "on the next tick": the task must not run before the
/// caller returns to the event loop.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task);
}
