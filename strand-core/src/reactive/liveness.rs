//! Liveness witnesses.
//!
//! After every run an effect records a witness: the thing whose liveness
//! decides whether the effect's subscriptions may be garbage collected. An
//! effect that renders a node returns it and is dropped once the node leaves
//! the document. An effect that returns nothing is live forever.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use super::context::untrack;
use super::effect::panic_message;
use crate::dom::Node;
use crate::error::EffectError;

/// Anything that can say whether it is still relevant.
pub trait Liveness {
    fn is_connected(&self) -> bool;
}

impl Liveness for Node {
    fn is_connected(&self) -> bool {
        Node::is_connected(self)
    }
}

impl<F> Liveness for F
where
    F: Fn() -> bool,
{
    fn is_connected(&self) -> bool {
        self()
    }
}

/// The liveness signal recorded for an effect.
#[derive(Clone, Default)]
pub enum Witness {
    /// Never collected.
    #[default]
    Always,
    /// Collected once the inner predicate reports disconnection.
    Tied(Rc<dyn Liveness>),
}

impl Witness {
    pub fn node(node: Node) -> Self {
        Witness::Tied(Rc::new(node))
    }

    /// Tie liveness to an arbitrary predicate.
    pub fn predicate(f: impl Fn() -> bool + 'static) -> Self {
        Witness::Tied(Rc::new(f))
    }

    /// Ask the witness whether it is still connected.
    ///
    /// The check runs untracked, so reads it makes never become dependencies
    /// of a running effect. A check that panics reports the effect as gone.
    pub fn is_live(&self) -> bool {
        let Witness::Tied(target) = self else {
            return true;
        };

        untrack(|| panic::catch_unwind(AssertUnwindSafe(|| target.is_connected())))
            .unwrap_or_else(|payload| {
                tracing::error!(error = %panic_message(payload.as_ref()), "liveness check panicked, treating as disconnected");
                false
            })
    }
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Witness::Always => f.write_str("Always"),
            Witness::Tied(_) => f
                .debug_struct("Tied")
                .field("connected", &self.is_live())
                .finish(),
        }
    }
}

/// What an effect body may return.
///
/// `()` and `None` mean "always live"; a [`Node`] or [`Witness`] is used as
/// the witness; an `Err` is logged by the tracker and the run is treated as
/// having produced nothing.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Witness, EffectError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Witness, EffectError> {
        Ok(Witness::Always)
    }
}

impl IntoOutcome for Witness {
    fn into_outcome(self) -> Result<Witness, EffectError> {
        Ok(self)
    }
}

impl IntoOutcome for Node {
    fn into_outcome(self) -> Result<Witness, EffectError> {
        Ok(Witness::node(self))
    }
}

impl<T: IntoOutcome> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Result<Witness, EffectError> {
        self.map_or(Ok(Witness::Always), IntoOutcome::into_outcome)
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: fmt::Display,
{
    fn into_outcome(self) -> Result<Witness, EffectError> {
        self.map_err(|err| EffectError::Failed(err.to_string()))
            .and_then(IntoOutcome::into_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::context::{self, TrackingFrame};
    use crate::reactive::state::StateCell;
    use crate::reactive::{Runtime, Value};
    use crate::schedule::ManualScheduler;
    use std::cell::Cell;

    #[test]
    fn unit_is_always_live() {
        let witness = ().into_outcome().unwrap();
        assert!(witness.is_live());
        assert!(matches!(witness, Witness::Always));
    }

    #[test]
    fn node_witness_follows_connectivity() {
        let doc = Node::document();
        let div = Node::element("div");
        doc.append_child(&div);

        let witness = div.clone().into_outcome().unwrap();
        assert!(witness.is_live());

        div.remove();
        assert!(!witness.is_live());
    }

    #[test]
    fn predicate_witness() {
        let alive = Rc::new(Cell::new(true));
        let flag = alive.clone();
        let witness = Witness::predicate(move || flag.get());

        assert!(witness.is_live());
        alive.set(false);
        assert!(!witness.is_live());
    }

    #[test]
    fn panicking_predicate_is_not_live() {
        let witness = Witness::predicate(|| -> bool { panic!("target vanished") });

        assert!(!witness.is_live());
        assert!(!context::is_tracking());
    }

    #[test]
    fn predicate_reads_are_not_tracked() {
        let runtime = Runtime::with_scheduler(ManualScheduler::new());
        let state = StateCell::new("visible".into(), Value::from(true), runtime);

        let s = state.clone();
        let witness = Witness::predicate(move || s.get().is_truthy());

        let frame = TrackingFrame::enter();
        assert!(witness.is_live());
        let frame = frame.exit();

        assert!(frame.getters.is_empty());
    }

    #[test]
    fn none_is_always_live() {
        let witness = None::<Node>.into_outcome().unwrap();
        assert!(matches!(witness, Witness::Always));
    }

    #[test]
    fn err_becomes_effect_error() {
        let outcome: Result<(), &str> = Err("template missing");
        assert_eq!(
            outcome.into_outcome().unwrap_err(),
            EffectError::Failed("template missing".into())
        );
    }
}
