//! Reactive Core
//!
//! This module implements the dependency-tracking and scheduling engine:
//! scopes of state records, tracked effects, and the runtime that batches
//! mutations and replays effects.
//!
//! # Concepts
//!
//! ## States
//!
//! A state record holds one scope key's value and the set of effects
//! subscribed to it. States are created lazily on first access and are
//! reached through a [`Scope`].
//!
//! ## Effects
//!
//! An effect is a closure run under [`track`]. Every state it reads during a
//! run becomes a dependency; when any of them changes, the effect runs again
//! and its dependencies are re-discovered from scratch. The closure's return
//! value is its liveness witness (see [`Witness`]).
//!
//! ## Runtime
//!
//! Writes do not run effects directly. They join a batch owned by the
//! [`Runtime`], which is flushed on the next tick of its scheduler, so any
//! number of synchronous writes cost each affected effect one re-run.
//!
//! # Implementation Notes
//!
//! The active collector is a thread-local stack of tracking frames, the same
//! automatic dependency tracking used by SolidJS, Vue 3 and Leptos. The whole
//! engine is single-threaded: states, effects and the runtime are `Rc`-shared
//! and never cross threads.

mod context;
mod effect;
mod liveness;
mod runtime;
mod scope;
mod state;
mod subscriber;
mod value;

pub use context::{is_tracking, untrack};
pub use effect::{track, Effect};
pub use liveness::{IntoOutcome, Liveness, Witness};
pub use runtime::Runtime;
pub use scope::{Definition, Scope, ScopeBuilder};
pub use subscriber::{EffectId, StateId};
pub use value::Value;
