//! Tracking Context
//!
//! The tracking context records which states an effect reads and writes
//! while it runs. This is what lets an effect re-discover its dependencies on
//! every run without declaring them.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running an effect pushes a fresh
//! frame; reads and writes land in the top frame; the frame is popped when
//! the run finishes. Nested effects push their own frame, so a parent never
//! sees the reads of an effect it creates.
//!
//! `untrack` pushes a marker frame that swallows reads. Writes made under it
//! still go to the nearest real frame, since they are writes of the
//! enclosing effect run.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::state::StateCell;
use super::StateId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Entry>> = RefCell::new(Vec::new());
}

enum Entry {
    Tracking(Frame),
    Untracked,
}

/// Reads and writes collected during one effect run.
#[derive(Default)]
pub(crate) struct Frame {
    /// States read, in first-read order.
    pub(crate) getters: IndexMap<StateId, Rc<StateCell>>,
    /// States written. Usually a handful, so a linear scan is fine.
    pub(crate) setters: SmallVec<[StateId; 4]>,
}

impl Frame {
    pub(crate) fn wrote(&self, id: StateId) -> bool {
        self.setters.contains(&id)
    }
}

/// Guard for an active tracking frame.
///
/// Pops the frame when dropped, so the stack stays balanced even if the
/// code in between unwinds.
pub(crate) struct TrackingFrame {
    depth: usize,
    exited: bool,
}

impl TrackingFrame {
    /// Push a fresh frame.
    pub(crate) fn enter() -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Entry::Tracking(Frame::default()));
            stack.len()
        });

        Self {
            depth,
            exited: false,
        }
    }

    /// Pop the frame and hand back what it collected.
    pub(crate) fn exit(mut self) -> Frame {
        self.exited = true;
        match pop(self.depth) {
            Some(Entry::Tracking(frame)) => frame,
            _ => Frame::default(),
        }
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        if !self.exited {
            pop(self.depth);
        }
    }
}

fn pop(depth: usize) -> Option<Entry> {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();

        // Verify we're popping the frame we pushed.
        debug_assert_eq!(
            stack.len(),
            depth,
            "tracking context mismatch: expected depth {}, found {}",
            depth,
            stack.len()
        );

        stack.pop()
    })
}

/// Check if an effect run is currently recording reads.
pub fn is_tracking() -> bool {
    CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Entry::Tracking(_))))
}

/// Record a read of `state` in the current frame, if any.
pub(crate) fn record_read(state: &Rc<StateCell>) {
    CONTEXT_STACK.with(|stack| {
        if let Some(Entry::Tracking(frame)) = stack.borrow_mut().last_mut() {
            frame
                .getters
                .entry(state.id())
                .or_insert_with(|| Rc::clone(state));
        }
    });
}

/// Record a write of `id` in the nearest tracking frame, if any.
pub(crate) fn record_write(id: StateId) {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let frame = stack.iter_mut().rev().find_map(|entry| match entry {
            Entry::Tracking(frame) => Some(frame),
            Entry::Untracked => None,
        });
        if let Some(frame) = frame {
            if !frame.wrote(id) {
                frame.setters.push(id);
            }
        }
    });
}

/// Run `f` without recording any reads into the current effect.
///
/// ```rust
/// use strand_core::{track, untrack, Runtime, Scope};
/// use strand_core::schedule::ManualScheduler;
///
/// let clock = ManualScheduler::new();
/// let runtime = Runtime::with_scheduler(clock.clone());
/// let scope = Scope::builder().define("a", 1).define("b", 2).join(&runtime);
///
/// let s = scope.clone();
/// track(move || {
///     let _a = s.get("a");
///     let _b = untrack(|| s.get("b"));
/// });
///
/// assert_eq!(scope.subscriber_count("a"), 1);
/// assert_eq!(scope.subscriber_count("b"), 0);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    struct UntrackGuard {
        depth: usize,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            pop(self.depth);
        }
    }

    let depth = CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Entry::Untracked);
        stack.len()
    });

    let _guard = UntrackGuard { depth };
    f()
}
