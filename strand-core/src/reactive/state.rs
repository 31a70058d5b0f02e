//! State Records
//!
//! A state record is the reactive cell behind one scope key. It holds the
//! current value and the set of effects to re-run when that value changes.
//!
//! # Subscriber sets
//!
//! The set only grows through tracking (an effect read the state) and only
//! shrinks through reconciliation (the effect stopped reading it) or through
//! pruning (the effect's liveness witness went away). Pruning happens before
//! every new subscription, at the start of every flush, and in the delayed
//! sweep the runtime schedules for each new subscription.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context;
use super::effect::EffectCell;
use super::runtime::Runtime;
use super::value::Value;
use super::{EffectId, StateId};

pub(crate) struct StateCell {
    id: StateId,
    key: Rc<str>,
    value: RefCell<Value>,
    subscribers: RefCell<IndexMap<EffectId, Rc<EffectCell>>>,
    runtime: Runtime,
}

impl StateCell {
    pub(crate) fn new(key: Rc<str>, value: Value, runtime: Runtime) -> Rc<Self> {
        Rc::new(Self {
            id: StateId::new(),
            key,
            value: RefCell::new(value),
            subscribers: RefCell::new(IndexMap::new()),
            runtime,
        })
    }

    pub(crate) fn id(&self) -> StateId {
        self.id
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Read the value, recording the read in the active tracking frame.
    pub(crate) fn get(self: &Rc<Self>) -> Value {
        context::record_read(self);
        self.peek()
    }

    /// Read the value without tracking.
    pub(crate) fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Store a new value.
    ///
    /// Strictly equal writes are dropped without propagation. Otherwise the
    /// state joins the pending batch if anything is subscribed to it.
    pub(crate) fn set(self: &Rc<Self>, value: Value) {
        context::record_write(self.id);

        if self.value.borrow().same(&value) {
            return;
        }
        *self.value.borrow_mut() = value;

        if !self.subscribers.borrow().is_empty() {
            self.runtime.enqueue(Rc::clone(self));
        }
    }

    /// Drop every subscriber whose liveness witness has disconnected.
    pub(crate) fn prune(&self) {
        // Witnesses are user code and may touch this state; check a snapshot.
        let dead: Vec<Rc<EffectCell>> = self
            .subscribers()
            .into_iter()
            .filter(|effect| !effect.is_live())
            .collect();

        if dead.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.borrow_mut();
        for effect in dead {
            subscribers.shift_remove(&effect.id());
            effect.forget_source(self.id);
            tracing::trace!(state = %self.id, key = %self.key, effect = %effect.id(), "pruned disconnected subscriber");
        }
    }

    /// Subscribe `effect`, pruning disconnected subscribers first.
    pub(crate) fn subscribe(self: &Rc<Self>, effect: &Rc<EffectCell>) {
        self.prune();

        let added = self
            .subscribers
            .borrow_mut()
            .insert(effect.id(), Rc::clone(effect))
            .is_none();

        if added {
            tracing::trace!(state = %self.id, key = %self.key, effect = %effect.id(), "subscribed");
            self.runtime.schedule_sweep(self, effect);
        }
    }

    /// Remove `effect` from the subscriber set. Removing an absent effect is a no-op.
    pub(crate) fn unsubscribe(&self, effect: EffectId) -> bool {
        let removed = self.subscribers.borrow_mut().shift_remove(&effect).is_some();
        if removed {
            tracing::trace!(state = %self.id, key = %self.key, effect = %effect, "unsubscribed");
        }
        removed
    }

    /// Snapshot of the current subscribers.
    pub(crate) fn subscribers(&self) -> Vec<Rc<EffectCell>> {
        self.subscribers.borrow().values().cloned().collect()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub(crate) fn is_subscribed(&self, effect: EffectId) -> bool {
        self.subscribers.borrow().contains_key(&effect)
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
