//! Error taxonomy for the tree-grid engine.
//!
//! Structural misuse (moving a node below its own descendant, duplicate
//! keys, operating on detached nodes) is reported fail-fast through
//! `TreeError`. Load failures are *not* raised this way: the loader
//! recovers locally by installing an error status node and emitting a
//! `LoadError` event, so the tree stays usable.

use crate::tree::NodeId;

/// Errors raised by structural tree operations and payload parsing.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A node with this key is already registered in the tree.
    #[error("duplicate node key `{0}`")]
    DuplicateKey(String),

    /// No node with this key exists.
    #[error("unknown node key `{0}`")]
    UnknownKey(String),

    /// No node with this id exists (it may have been removed).
    #[error("unknown node id {0}")]
    UnknownNode(NodeId),

    /// Attempted to move a node below itself or one of its descendants.
    #[error("cannot move a node below its own descendant")]
    CyclicMove,

    /// The target node is not attached to the tree.
    #[error("node {0} is detached from the tree")]
    DetachedParent(NodeId),

    /// The operation does not apply to this node (e.g. moving the root).
    #[error("invalid target for `{0}`")]
    InvalidTarget(&'static str),

    /// `load_lazy` was called for a node that is not marked lazy.
    #[error("node {0} is not lazy")]
    NotLazy(NodeId),

    /// A source payload could not be decoded.
    #[error("malformed source payload: {0}")]
    Parse(String),

    /// The child source reported a failure for a synchronous reply.
    #[error("child source failed: {0}")]
    Source(String),
}
