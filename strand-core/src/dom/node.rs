//! Tree nodes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// What kind of node this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The root of a tree. A node is connected iff its ancestor chain reaches one.
    Document,

    /// An element with a tag name.
    Element(String),

    /// A leaf holding text.
    Text,
}

struct NodeData {
    kind: NodeKind,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
}

/// A shared handle to a node. Clones point at the same node.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self(Rc::new(NodeData {
            kind,
            text: RefCell::new(text),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// Create a new document root.
    pub fn document() -> Self {
        Self::with_kind(NodeKind::Document, String::new())
    }

    /// Create a detached element.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Element(tag.into()), String::new())
    }

    /// Create a detached text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, content.into())
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Tag name for elements, `None` otherwise.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// Whether two handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    /// Whether `self` is `other` or one of its ancestors.
    fn contains(&self, other: &Node) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(node) = cursor {
            if node.ptr_eq(self) {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Append `child` as the last child, detaching it from its current parent.
    ///
    /// Returns `false` and leaves the tree untouched if the append would
    /// create a cycle or if `self` is a text node.
    pub fn append_child(&self, child: &Node) -> bool {
        if self.0.kind == NodeKind::Text || child.contains(self) {
            return false;
        }
        child.remove();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
        true
    }

    /// Detach from the parent. A no-op for detached nodes.
    pub fn remove(&self) {
        let parent = self.0.parent.replace(Weak::new());
        if let Some(parent) = parent.upgrade() {
            parent
                .children
                .borrow_mut()
                .retain(|sibling| !Rc::ptr_eq(&sibling.0, &self.0));
        }
    }

    /// Whether the ancestor chain reaches a document.
    pub fn is_connected(&self) -> bool {
        let mut cursor = Some(self.clone());
        while let Some(node) = cursor {
            if node.0.kind == NodeKind::Document {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Replace the node's text.
    ///
    /// For elements and documents this drops every child and appends a single
    /// text node, like the DOM `textContent` setter.
    pub fn set_text(&self, content: impl Into<String>) {
        if self.0.kind == NodeKind::Text {
            *self.0.text.borrow_mut() = content.into();
            return;
        }
        for child in self.children() {
            child.remove();
        }
        self.append_child(&Node::text(content));
    }

    /// The concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.0.text.borrow().clone(),
            _ => self
                .0
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.0.kind)
            .field("connected", &self.is_connected())
            .field("children", &self.0.children.borrow().len())
            .finish()
    }
}
