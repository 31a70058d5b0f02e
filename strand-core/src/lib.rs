//! Strand Core
//!
//! This crate provides the reactive engine behind the Strand templating
//! library. It implements:
//!
//! - Reactive scopes of lazily created state records
//! - Tracked effects with automatic dependency re-discovery
//! - Batched, deferred re-execution with circular-write suppression
//! - Garbage collection of subscriptions whose DOM node left the document
//!
//! Element builders, template hydration and control-flow components are
//! built on top of this crate; they only use the scope API and `track`.
//!
//! # Architecture
//!
//! - `reactive`: scopes, states, effects, and the batching runtime
//! - `schedule`: the deferred-work seam (manual clock or tokio `LocalSet`)
//! - `dom`: a minimal node tree used as rendering target and liveness signal
//! - `config`: runtime tunables
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use strand_core::{track, Runtime, Scope};
//! use strand_core::dom::Node;
//! use strand_core::schedule::ManualScheduler;
//!
//! let clock = ManualScheduler::new();
//! let runtime = Runtime::with_scheduler(clock.clone());
//!
//! // Define and materialize a scope
//! let scope = Scope::builder()
//!     .define("count", 0)
//!     .define("name", "John")
//!     .join(&runtime);
//!
//! // Bind a text node to it
//! let document = Node::document();
//! let text = Node::text("");
//! document.append_child(&text);
//!
//! let (s, t) = (scope.clone(), text.clone());
//! track(move || {
//!     t.set_text(format!("{} clicked {} times", s.get("name"), s.get("count")));
//!     t.clone()
//! });
//!
//! // Writes in the same tick coalesce into one re-run
//! scope.set("count", 1);
//! scope.set("count", 2);
//! clock.tick();
//! assert_eq!(text.text_content(), "John clicked 2 times");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod schedule;

pub use reactive::{
    is_tracking, track, untrack, Effect, IntoOutcome, Liveness, Runtime, Scope, ScopeBuilder,
    Value, Witness,
};
