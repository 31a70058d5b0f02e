//! Reactive Runtime
//!
//! The runtime batches state mutations and replays the affected effects.
//!
//! # How It Works
//!
//! 1. When a state with subscribers changes, it joins the pending batch. The
//!    first mutation of a round opens the batch and schedules a flush for the
//!    next tick, so every write made before control returns to the event loop
//!    lands in the same round.
//!
//! 2. A flush repeats until the batch is empty:
//!    a. take the batch, leaving a fresh empty one for writes made during
//!       this pass;
//!    b. prune disconnected subscribers of every state in it;
//!    c. collect the union of surviving subscribers;
//!    d. re-run each collected effect exactly once.
//!
//!    Effects that write state during (d) fill the fresh batch, and the loop
//!    settles those chained updates before returning.
//!
//! 3. Once the batch is empty it is torn down until the next mutation.
//!
//! # Garbage Collection
//!
//! Every new subscription also schedules a delayed sweep that drops the
//! subscription if the effect's witness has disconnected by then. Sweeps
//! hold weak references only, so they never keep a state or effect alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::effect::{self, EffectCell};
use super::state::StateCell;
use super::{EffectId, StateId};
use crate::config::RuntimeConfig;
use crate::schedule::Scheduler;

struct RuntimeInner {
    config: RuntimeConfig,
    scheduler: Rc<dyn Scheduler>,
    /// `None` when no round is open.
    pending: RefCell<Option<IndexMap<StateId, Rc<StateCell>>>>,
    flushing: Cell<bool>,
    flushes: Cell<u64>,
}

/// Handle to a batching runtime. Clones share the same batch.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, scheduler: impl Scheduler + 'static) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                scheduler: Rc::new(scheduler),
                pending: RefCell::new(None),
                flushing: Cell::new(false),
                flushes: Cell::new(0),
            }),
        }
    }

    /// A runtime with the default config.
    pub fn with_scheduler(scheduler: impl Scheduler + 'static) -> Self {
        Self::new(RuntimeConfig::default(), scheduler)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether a round is open and waiting for its flush.
    pub fn is_flush_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    /// Number of states in the open round.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().as_ref().map_or(0, IndexMap::len)
    }

    /// Number of completed flushes that ran at least one round.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    /// Add a mutated state to the open round, opening one if needed.
    pub(crate) fn enqueue(&self, state: Rc<StateCell>) {
        let opened = {
            let mut pending = self.inner.pending.borrow_mut();
            match pending.as_mut() {
                Some(batch) => {
                    batch.insert(state.id(), state);
                    false
                }
                None => {
                    let mut batch = IndexMap::new();
                    batch.insert(state.id(), state);
                    *pending = Some(batch);
                    true
                }
            }
        };

        if opened {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&self) {
        let runtime = Rc::downgrade(&self.inner);
        self.inner.scheduler.schedule(
            self.inner.config.flush_delay(),
            Box::new(move || {
                if let Some(inner) = runtime.upgrade() {
                    Runtime { inner }.flush();
                }
            }),
        );
        tracing::debug!("flush scheduled");
    }

    /// Drain the open round now, re-running affected effects until no more
    /// state changes.
    ///
    /// This is what the scheduled flush calls. Calling it directly settles
    /// everything synchronously. A call made while a flush is already running
    /// returns immediately; the running flush picks up the new writes.
    pub fn flush(&self) {
        if self.inner.flushing.get() || self.inner.pending.borrow().is_none() {
            return;
        }
        self.inner.flushing.set(true);
        let _guard = FlushGuard { runtime: self };

        let max_rounds = self.inner.config.max_flush_rounds;
        let mut rounds = 0;
        loop {
            let batch = {
                let mut pending = self.inner.pending.borrow_mut();
                let batch = pending.as_mut().map(std::mem::take).unwrap_or_default();
                if batch.is_empty() {
                    *pending = None;
                    break;
                }
                batch
            };

            if rounds == max_rounds {
                // Put the round back and yield to the event loop.
                if let Some(pending) = self.inner.pending.borrow_mut().as_mut() {
                    for (id, state) in batch {
                        pending.entry(id).or_insert(state);
                    }
                }
                tracing::error!(
                    rounds,
                    "flush did not settle, deferring the rest to the next tick"
                );
                self.schedule_flush();
                return;
            }
            rounds += 1;

            let mut effects: IndexMap<EffectId, Rc<EffectCell>> = IndexMap::new();
            for state in batch.values() {
                state.prune();
                for subscriber in state.subscribers() {
                    effects.entry(subscriber.id()).or_insert(subscriber);
                }
            }

            for cell in effects.values() {
                effect::execute(cell);
            }
        }

        self.inner.flushes.set(self.inner.flushes.get() + 1);
        tracing::debug!(rounds, "flush settled");
    }

    /// Schedule the delayed liveness sweep for a new subscription.
    pub(crate) fn schedule_sweep(&self, state: &Rc<StateCell>, effect: &Rc<EffectCell>) {
        let state: Weak<StateCell> = Rc::downgrade(state);
        let effect: Weak<EffectCell> = Rc::downgrade(effect);

        self.inner.scheduler.schedule(
            self.inner.config.sweep_delay(),
            Box::new(move || {
                let (Some(state), Some(effect)) = (state.upgrade(), effect.upgrade()) else {
                    return;
                };
                if !effect.is_live() && state.unsubscribe(effect.id()) {
                    effect.forget_source(state.id());
                    tracing::trace!(state = %state.id(), key = state.key(), effect = %effect.id(), "swept disconnected subscriber");
                }
            }),
        );
    }
}

/// Clears the flushing flag when a flush ends, including by unwinding.
///
/// A flush that unwinds leaves its round open; the guard schedules another
/// flush to drain it.
struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let inner = &self.runtime.inner;
        inner.flushing.set(false);

        if std::thread::panicking() {
            let open = inner.pending.try_borrow().map_or(false, |pending| pending.is_some());
            tracing::error!(open, "flush unwound");
            if open {
                self.runtime.schedule_flush();
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_len())
            .field("flushing", &self.inner.flushing.get())
            .field("flushes", &self.flush_count())
            .finish()
    }
}
