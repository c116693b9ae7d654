//! Lifecycle event vocabulary.
//!
//! Events are fire-and-forget notifications from the engine to the
//! embedding collaborator (row host, keyboard layer, persistence layer).
//! They are delivered synchronously through an optional sink installed
//! with [`crate::Tree::set_event_sink`]; the sink must not call back
//! into the tree.

use crate::tree::NodeId;

/// Structural child-list modification kinds, reported with
/// [`TreeEvent::ModifyChild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildModOp {
    Add,
    Remove,
    Move,
    Sort,
}

/// Notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// A node was expanded.
    Expand { node: NodeId },
    /// A node was collapsed.
    Collapse { node: NodeId },
    /// A node's selection flag changed (fired for the origin node of a
    /// selection operation, after hierarchical propagation settled).
    Select { node: NodeId, selected: bool },
    /// A node became the active node.
    Activate { node: NodeId },
    /// The previously active node lost that state.
    Deactivate { node: NodeId },
    /// Children for a node finished loading.
    Load { node: NodeId },
    /// A load attempt failed; an error status node was installed.
    LoadError { node: NodeId, message: String },
    /// A row representation left the render window and was discarded.
    Discard { node: NodeId },
    /// A parent's child list was modified.
    ModifyChild { parent: NodeId, op: ChildModOp },
    /// A scheduler drain finished.
    UpdateComplete,
}

/// Boxed event consumer.
pub type EventSink = Box<dyn FnMut(&TreeEvent)>;
