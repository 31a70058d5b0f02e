//! Reactive Scopes
//!
//! A scope is a namespace of state records with a shared lifecycle. It is
//! built in two steps: a [`ScopeBuilder`] collects key definitions, then
//! `join` materializes a live [`Scope`].
//!
//! States are created lazily. The first `get` or `set` of a key creates its
//! state from, in order of preference, the join-time override, the builder's
//! definition, or [`Value::Undefined`]. Unknown keys are never an error.
//!
//! # Derivations
//!
//! A key defined with [`ScopeBuilder::derive`] is computed by a function of
//! the scope. The function runs as an effect that writes the key, so it is
//! re-run whenever anything it reads changes, and derived values settle in
//! the same flush as their inputs. Because evaluation is lazy, a derivation
//! may read keys defined later in the builder chain.
//!
//! ```rust
//! use strand_core::{Runtime, Scope, Value};
//! use strand_core::schedule::ManualScheduler;
//!
//! let clock = ManualScheduler::new();
//! let runtime = Runtime::with_scheduler(clock.clone());
//!
//! let scope = Scope::builder()
//!     .derive("greeting", |s| format!("Hello, {}", s.get("name")))
//!     .define("name", "John")
//!     .join(&runtime);
//!
//! assert_eq!(scope.get("greeting"), Value::from("Hello, John"));
//!
//! scope.set("name", "Jane");
//! clock.tick();
//! assert_eq!(scope.get("greeting"), Value::from("Hello, Jane"));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::effect::Effect;
use super::runtime::Runtime;
use super::state::StateCell;
use super::value::Value;

type Derivation = Rc<dyn Fn(&Scope) -> Value>;

/// How a key gets its first value.
#[derive(Clone)]
pub enum Definition {
    /// A literal default.
    Value(Value),
    /// A function of the scope, kept up to date as an effect.
    Derive(Derivation),
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Definition::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// Collects key definitions for a scope.
///
/// A builder can be joined any number of times; each join produces an
/// independent scope.
#[derive(Clone, Default)]
pub struct ScopeBuilder {
    definitions: IndexMap<Rc<str>, Definition>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `key` with a literal default. Redefining a key replaces it.
    pub fn define(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.definitions
            .insert(Rc::from(key), Definition::Value(value.into()));
        self
    }

    /// Define `key` as a function of the scope.
    ///
    /// Derivations that do not need the scope can ignore the argument.
    pub fn derive<F, V>(mut self, key: &str, derive: F) -> Self
    where
        F: Fn(&Scope) -> V + 'static,
        V: Into<Value>,
    {
        let derive: Derivation = Rc::new(move |scope: &Scope| -> Value { derive(scope).into() });
        self.definitions
            .insert(Rc::from(key), Definition::Derive(derive));
        self
    }

    pub fn definition(&self, key: &str) -> Option<&Definition> {
        self.definitions.get(key)
    }

    /// Materialize a live scope.
    pub fn join(&self, runtime: &Runtime) -> Scope {
        self.join_with(runtime, std::iter::empty::<(&str, Value)>())
    }

    /// Materialize a live scope, replacing the definitions of the given keys
    /// with plain initial values.
    ///
    /// This is how a parent passes values into a child scope. The values are
    /// copied; the two scopes are not linked afterwards.
    pub fn join_with<K, V>(&self, runtime: &Runtime, overrides: impl IntoIterator<Item = (K, V)>) -> Scope
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let overrides: IndexMap<Rc<str>, Value> = overrides
            .into_iter()
            .map(|(key, value)| (Rc::from(key.as_ref()), value.into()))
            .collect();

        Scope {
            inner: Rc::new(ScopeInner {
                runtime: runtime.clone(),
                definitions: Rc::new(self.definitions.clone()),
                overrides: RefCell::new(overrides),
                states: RefCell::new(IndexMap::new()),
            }),
        }
    }
}

impl fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.definitions.iter()).finish()
    }
}

struct ScopeInner {
    runtime: Runtime,
    definitions: Rc<IndexMap<Rc<str>, Definition>>,
    /// Join-time values not yet consumed by a state.
    overrides: RefCell<IndexMap<Rc<str>, Value>>,
    states: RefCell<IndexMap<Rc<str>, Rc<StateCell>>>,
}

/// A live scope. Clones share the same states.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Read `key`, subscribing the running effect to it.
    pub fn get(&self, key: &str) -> Value {
        self.state(key).get()
    }

    /// Read `key` without subscribing.
    pub fn peek(&self, key: &str) -> Value {
        self.state(key).peek()
    }

    /// Write `key`. Strictly equal writes do nothing.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.state(key).set(value.into());
    }

    /// Write `key` from its current value. The read is not tracked.
    pub fn update<V: Into<Value>>(&self, key: &str, f: impl FnOnce(&Value) -> V) {
        let state = self.state(key);
        let next = f(&state.peek()).into();
        state.set(next);
    }

    /// Whether `key` was defined, overridden, or has been touched.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.states.borrow().contains_key(key)
            || self.inner.definitions.contains_key(key)
            || self.inner.overrides.borrow().contains_key(key)
    }

    /// Defined keys followed by keys created on demand.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.definitions.keys().map(|k| k.to_string()).collect();
        for key in self.inner.states.borrow().keys() {
            if !self.inner.definitions.contains_key(key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    /// Number of effects subscribed to `key`. Does not create the state.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .states
            .borrow()
            .get(key)
            .map_or(0, |state| state.subscriber_count())
    }

    fn state(&self, key: &str) -> Rc<StateCell> {
        if let Some(state) = self.inner.states.borrow().get(key) {
            return Rc::clone(state);
        }

        let key: Rc<str> = Rc::from(key);
        let initial = self.inner.overrides.borrow_mut().shift_remove(&*key);
        let (initial, derive) = match (initial, self.inner.definitions.get(&*key)) {
            (Some(value), _) => (value, None),
            (None, Some(Definition::Value(value))) => (value.clone(), None),
            (None, Some(Definition::Derive(derive))) => (Value::Undefined, Some(Rc::clone(derive))),
            (None, None) => (Value::Undefined, None),
        };

        let state = StateCell::new(Rc::clone(&key), initial, self.inner.runtime.clone());
        self.inner
            .states
            .borrow_mut()
            .insert(Rc::clone(&key), Rc::clone(&state));

        if let Some(derive) = derive {
            self.install_derivation(key, derive);
        }

        state
    }

    fn install_derivation(&self, key: Rc<str>, derive: Derivation) {
        let scope: Weak<ScopeInner> = Rc::downgrade(&self.inner);
        Effect::new(move || {
            if let Some(inner) = scope.upgrade() {
                let scope = Scope { inner };
                let value = derive(&scope);
                scope.set(&key, value);
            }
        });
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.inner
                    .states
                    .borrow()
                    .iter()
                    .map(|(key, state)| (key.to_string(), state.peek())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::track;
    use crate::schedule::ManualScheduler;
    use std::cell::Cell;

    fn setup() -> (ManualScheduler, Runtime) {
        let clock = ManualScheduler::new();
        let runtime = Runtime::with_scheduler(clock.clone());
        (clock, runtime)
    }

    #[test]
    fn defaults_are_returned() {
        let (_clock, runtime) = setup();
        let scope = Scope::builder()
            .define("count", 0)
            .define("name", "John")
            .join(&runtime);

        assert_eq!(scope.get("count"), Value::from(0));
        assert_eq!(scope.get("name"), Value::from("John"));
    }

    #[test]
    fn unknown_keys_are_created_on_demand() {
        let (_clock, runtime) = setup();
        let scope = Scope::builder().join(&runtime);

        assert!(!scope.contains("missing"));
        assert_eq!(scope.get("missing"), Value::Undefined);
        assert!(scope.contains("missing"));

        scope.set("fresh", 3);
        assert_eq!(scope.get("fresh"), Value::from(3));
        assert_eq!(scope.keys(), vec!["missing".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn overrides_replace_definitions() {
        let (_clock, runtime) = setup();
        let builder = Scope::builder()
            .define("count", 0)
            .derive("label", |_| "derived");

        let scope = builder.join_with(&runtime, [("count", Value::from(7)), ("label", Value::from("given"))]);

        assert_eq!(scope.get("count"), Value::from(7));
        assert_eq!(scope.get("label"), Value::from("given"));
    }

    #[test]
    fn builder_joins_independent_scopes() {
        let (_clock, runtime) = setup();
        let builder = Scope::builder().define("count", 0);

        let first = builder.join(&runtime);
        let second = builder.join(&runtime);

        first.set("count", 5);
        assert_eq!(first.get("count"), Value::from(5));
        assert_eq!(second.get("count"), Value::from(0));
    }

    #[test]
    fn derivation_may_reference_later_key() {
        let (_clock, runtime) = setup();
        let scope = Scope::builder()
            .derive("doubled", |s| s.get("count").as_number().unwrap_or_default() * 2.0)
            .define("count", 21)
            .join(&runtime);

        assert_eq!(scope.get("doubled"), Value::from(42));
    }

    #[test]
    fn derivation_stays_live() {
        let (clock, runtime) = setup();
        let scope = Scope::builder()
            .define("count", 1)
            .derive("doubled", |s| s.get("count").as_number().unwrap_or_default() * 2.0)
            .join(&runtime);

        assert_eq!(scope.get("doubled"), Value::from(2));

        scope.set("count", 4);
        clock.tick();
        assert_eq!(scope.peek("doubled"), Value::from(8));
    }

    #[test]
    fn derived_chain_settles_in_one_flush() {
        let (clock, runtime) = setup();
        let scope = Scope::builder()
            .define("count", 1)
            .derive("doubled", |s| s.get("count").as_number().unwrap_or_default() * 2.0)
            .derive("label", |s| format!("x{}", s.get("doubled")))
            .join(&runtime);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (s, log) = (scope.clone(), seen.clone());
        track(move || log.borrow_mut().push(s.get("label").to_string()));

        scope.set("count", 3);
        clock.tick();

        assert_eq!(*seen.borrow(), vec!["x2".to_string(), "x6".to_string()]);
        assert_eq!(runtime.flush_count(), 1);
    }

    #[test]
    fn update_reads_untracked() {
        let (_clock, runtime) = setup();
        let scope = Scope::builder().define("count", 1).join(&runtime);

        scope.update("count", |v| v.as_number().unwrap_or_default() + 1.0);
        assert_eq!(scope.peek("count"), Value::from(2));
    }

    #[test]
    fn peek_does_not_subscribe() {
        let (_clock, runtime) = setup();
        let scope = Scope::builder().define("a", 1).join(&runtime);

        let s = scope.clone();
        track(move || {
            let _ = s.peek("a");
        });
        assert_eq!(scope.subscriber_count("a"), 0);
    }

    #[test]
    fn parent_values_are_copied_into_child() {
        let (clock, runtime) = setup();
        let parent = Scope::builder().define("user", "John").join(&runtime);
        let child = Scope::builder()
            .define("user", Value::Undefined)
            .join_with(&runtime, [("user", parent.get("user"))]);

        assert_eq!(child.get("user"), Value::from("John"));

        let runs = Rc::new(Cell::new(0));
        let (c, r) = (child.clone(), runs.clone());
        track(move || {
            let _ = c.get("user");
            r.set(r.get() + 1);
        });

        parent.set("user", "Jane");
        clock.tick();

        assert_eq!(child.get("user"), Value::from("John"));
        assert_eq!(runs.get(), 1);
    }
}
