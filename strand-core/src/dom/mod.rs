//! Node Tree
//!
//! A minimal in-memory document tree. It is the rendering target effects
//! write into and the source of the liveness signal: an effect that returns a
//! [`Node`] stays subscribed only while that node is connected to a document.
//!
//! Element construction, attributes and templating live outside this crate;
//! they only need `append_child`, `remove`, `set_text` and `is_connected`.

mod node;

pub use node::{Node, NodeKind};
