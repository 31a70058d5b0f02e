//! Tokio-backed scheduler.
//!
//! Tasks hold `Rc` handles into the reactive graph, so they are spawned with
//! `tokio::task::spawn_local`. The scheduler must therefore be used from
//! inside a [`tokio::task::LocalSet`].

use std::time::Duration;

use super::{Scheduler, Task};

/// Runs deferred work on the current tokio `LocalSet`.
///
/// A zero delay yields once to the runtime before running the task, which
/// gives every other ready task a chance to run first (next-tick semantics).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScheduler;

impl LocalScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for LocalScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    #[tokio::test(start_paused = true)]
    async fn runs_task_after_delay() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(Cell::new(false));
                let flag = fired.clone();

                LocalScheduler::new()
                    .schedule(Duration::from_millis(500), Box::new(move || flag.set(true)));
                assert!(!fired.get());

                tokio::time::sleep(Duration::from_millis(400)).await;
                assert!(!fired.get());

                tokio::time::sleep(Duration::from_millis(200)).await;
                assert!(fired.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_does_not_run_inline() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(Cell::new(false));
                let flag = fired.clone();

                LocalScheduler.schedule(Duration::ZERO, Box::new(move || flag.set(true)));
                assert!(!fired.get());

                tokio::time::sleep(Duration::from_millis(1)).await;
                assert!(fired.get());
            })
            .await;
    }
}
