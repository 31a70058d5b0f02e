//! Effect Implementation
//!
//! An effect is a function whose reads are tracked and which re-runs when
//! anything it read changes.
//!
//! # How Effects Work
//!
//! 1. `track` runs the function immediately inside a fresh tracking frame.
//!
//! 2. Every state read during the run lands in the frame's getters, every
//!    state written in its setters.
//!
//! 3. After the run the effect is reconciled: it is subscribed to every state
//!    it read and did not write, and unsubscribed from states it read last
//!    time but not this time.
//!
//! 4. The value the function returned becomes its liveness witness.
//!
//! # Failures
//!
//! A panic or an `Err` result is caught at the tracking boundary and logged.
//! The run still counts: reads made before the failure are reconciled and the
//! witness falls back to "always live". One broken effect never stops a flush.
//!
//! # Circular writes
//!
//! An effect that reads and writes the same state in one run is not
//! subscribed to it. Without that, the write would schedule the effect again
//! on every run.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::{Frame, TrackingFrame};
use super::liveness::{IntoOutcome, Witness};
use super::state::StateCell;
use super::{EffectId, StateId};
use crate::error::EffectError;

type Body = Box<dyn FnMut() -> Result<Witness, EffectError>>;

pub(crate) struct EffectCell {
    id: EffectId,
    body: RefCell<Body>,
    witness: RefCell<Witness>,
    /// States subscribed to after the most recent run.
    sources: RefCell<IndexMap<StateId, Weak<StateCell>>>,
    runs: Cell<usize>,
}

impl EffectCell {
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_live(&self) -> bool {
        self.witness.borrow().is_live()
    }

    /// Drop `state` from the recorded sources after GC unsubscribed the effect.
    pub(crate) fn forget_source(&self, state: StateId) {
        self.sources.borrow_mut().shift_remove(&state);
    }
}

/// Run `effect` now and re-run it whenever a state it read changes.
///
/// ```rust
/// use strand_core::{track, Runtime, Scope};
/// use strand_core::dom::Node;
/// use strand_core::schedule::ManualScheduler;
///
/// let clock = ManualScheduler::new();
/// let runtime = Runtime::with_scheduler(clock.clone());
/// let scope = Scope::builder().define("count", 0).join(&runtime);
///
/// let text = Node::text("");
/// let (s, t) = (scope.clone(), text.clone());
/// track(move || t.set_text(s.get("count").to_string()));
/// assert_eq!(text.text_content(), "0");
///
/// scope.set("count", 1);
/// clock.tick();
/// assert_eq!(text.text_content(), "1");
/// ```
pub fn track<F, R>(effect: F)
where
    F: FnMut() -> R + 'static,
    R: IntoOutcome,
{
    Effect::new(effect);
}

/// Handle to a tracked effect.
///
/// The effect lives as long as some state is subscribed to it or a handle
/// exists. Clones share the same effect.
#[derive(Clone)]
pub struct Effect {
    cell: Rc<EffectCell>,
}

impl Effect {
    /// Track `body`, running it immediately.
    pub fn new<F, R>(mut run: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoOutcome,
    {
        let body: Body = Box::new(move || run().into_outcome());
        let cell = Rc::new(EffectCell {
            id: EffectId::new(),
            body: RefCell::new(body),
            witness: RefCell::new(Witness::Always),
            sources: RefCell::new(IndexMap::new()),
            runs: Cell::new(0),
        });

        execute(&cell);

        Self { cell }
    }

    pub fn id(&self) -> EffectId {
        self.cell.id
    }

    /// Run the effect again right now, re-discovering its dependencies.
    pub fn execute(&self) {
        execute(&self.cell);
    }

    /// Number of times the body has run, including failed runs.
    pub fn run_count(&self) -> usize {
        self.cell.runs.get()
    }

    /// Number of states the effect is subscribed to after its last run.
    pub fn dependency_count(&self) -> usize {
        self.cell.sources.borrow().len()
    }

    /// Whether the recorded witness still reports the effect as live.
    pub fn is_live(&self) -> bool {
        self.cell.is_live()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.cell.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("live", &self.is_live())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run an effect under a fresh tracking frame and reconcile its subscriptions.
pub(crate) fn execute(cell: &Rc<EffectCell>) {
    let Ok(mut body) = cell.body.try_borrow_mut() else {
        tracing::warn!(effect = %cell.id, "effect re-entered while running, skipped");
        return;
    };

    let frame = TrackingFrame::enter();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut **body)()))
        .unwrap_or_else(|payload| Err(EffectError::Panicked(panic_message(payload.as_ref()))));
    let frame = frame.exit();
    drop(body);

    cell.runs.set(cell.runs.get() + 1);

    let witness = match outcome {
        Ok(witness) => witness,
        Err(error) => {
            tracing::error!(effect = %cell.id, %error, "effect failed");
            Witness::Always
        }
    };
    *cell.witness.borrow_mut() = witness;

    reconcile(cell, frame);
}

fn reconcile(cell: &Rc<EffectCell>, frame: Frame) {
    let Frame { getters, setters } = frame;
    let current: IndexMap<StateId, Rc<StateCell>> = getters
        .into_iter()
        .filter(|(id, _)| !setters.contains(id))
        .collect();

    let previous = std::mem::take(&mut *cell.sources.borrow_mut());
    for (id, state) in previous {
        if current.contains_key(&id) {
            continue;
        }
        if let Some(state) = state.upgrade() {
            state.unsubscribe(cell.id);
        }
    }

    for state in current.values() {
        state.subscribe(cell);
    }

    *cell.sources.borrow_mut() = current
        .iter()
        .map(|(id, state)| (*id, Rc::downgrade(state)))
        .collect();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Node;
    use crate::reactive::{context, Runtime, Value};
    use crate::schedule::ManualScheduler;

    fn state(runtime: &Runtime, key: &str, value: impl Into<Value>) -> Rc<StateCell> {
        StateCell::new(key.into(), value.into(), runtime.clone())
    }

    fn runtime() -> Runtime {
        Runtime::with_scheduler(ManualScheduler::new())
    }

    #[test]
    fn effect_runs_on_creation() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();

        let effect = Effect::new(move || c.set(c.get() + 1));

        assert_eq!(count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn execute_reruns_and_counts() {
        let effect = Effect::new(|| {});
        assert_eq!(effect.run_count(), 1);

        effect.execute();
        effect.execute();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.execute();
        assert_eq!(effect2.run_count(), 2);
    }

    #[test]
    fn subscribes_to_reads() {
        let runtime = runtime();
        let a = state(&runtime, "a", 1);
        let b = state(&runtime, "b", 2);

        let (sa, sb) = (a.clone(), b.clone());
        let effect = Effect::new(move || {
            let _ = sa.get();
            let _ = sb.get();
        });

        assert_eq!(effect.dependency_count(), 2);
        assert!(a.is_subscribed(effect.id()));
        assert!(b.is_subscribed(effect.id()));
    }

    #[test]
    fn rerun_drops_stale_dependencies() {
        let runtime = runtime();
        let gate = state(&runtime, "gate", true);
        let inner = state(&runtime, "inner", "x");

        let (g, i) = (gate.clone(), inner.clone());
        let effect = Effect::new(move || {
            if g.get().is_truthy() {
                let _ = i.get();
            }
        });
        assert!(inner.is_subscribed(effect.id()));

        gate.set(Value::from(false));
        effect.execute();

        assert!(!inner.is_subscribed(effect.id()));
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn read_and_write_of_same_state_is_not_subscribed() {
        let runtime = runtime();
        let flag = state(&runtime, "flag", false);
        let other = state(&runtime, "other", 0);

        let (f, o) = (flag.clone(), other.clone());
        let effect = Effect::new(move || {
            let current = f.get().is_truthy();
            f.set(Value::from(!current));
            let _ = o.get();
        });

        assert!(!flag.is_subscribed(effect.id()));
        assert!(other.is_subscribed(effect.id()));
        assert!(!runtime.is_flush_pending());
    }

    #[test]
    fn panic_is_caught_and_reads_before_it_are_kept() {
        let runtime = runtime();
        let a = state(&runtime, "a", 1);

        let sa = a.clone();
        let effect = Effect::new(move || -> () {
            let _ = sa.get();
            panic!("render failed");
        });

        assert_eq!(effect.run_count(), 1);
        assert!(a.is_subscribed(effect.id()));
        assert!(effect.is_live());
        assert!(!context::is_tracking());
    }

    #[test]
    fn err_result_is_logged_not_returned() {
        let runtime = runtime();
        let a = state(&runtime, "a", 1);

        let sa = a.clone();
        let effect = Effect::new(move || -> Result<Node, String> {
            let _ = sa.get();
            Err("no template".into())
        });

        assert!(a.is_subscribed(effect.id()));
        assert!(effect.is_live());
    }

    #[test]
    fn nested_effects_track_separately() {
        let runtime = runtime();
        let outer_state = state(&runtime, "outer", 1);
        let inner_state = state(&runtime, "inner", 2);

        let inner_handle: Rc<RefCell<Option<Effect>>> = Rc::default();
        let (o, i, slot) = (outer_state.clone(), inner_state.clone(), inner_handle.clone());
        let outer = Effect::new(move || {
            let _ = o.get();
            let i = i.clone();
            *slot.borrow_mut() = Some(Effect::new(move || {
                let _ = i.get();
            }));
        });

        let inner = inner_handle.borrow().clone().unwrap();
        assert!(outer_state.is_subscribed(outer.id()));
        assert!(!inner_state.is_subscribed(outer.id()));
        assert!(inner_state.is_subscribed(inner.id()));
        assert!(!outer_state.is_subscribed(inner.id()));
    }

    #[test]
    fn reentrant_execute_is_skipped() {
        let slot: Rc<RefCell<Option<Effect>>> = Rc::default();
        let inner_slot = slot.clone();

        let effect = Effect::new(move || {
            if let Some(me) = inner_slot.borrow().as_ref() {
                me.execute();
            }
        });
        *slot.borrow_mut() = Some(effect.clone());

        effect.execute();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn node_result_becomes_witness() {
        let doc = Node::document();
        let node = Node::element("li");
        doc.append_child(&node);

        let n = node.clone();
        let effect = Effect::new(move || n.clone());
        assert!(effect.is_live());

        node.remove();
        assert!(!effect.is_live());
    }

    #[test]
    fn panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
