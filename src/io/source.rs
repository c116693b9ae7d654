//! Collaborator-facing child source contract.
//!
//! A [`ChildSource`] answers "give me the children of this node" with
//! either immediate data or a deferred reply channel. The engine polls
//! deferred replies once per host tick ([`crate::Tree::poll_loads`]),
//! so sources may resolve from background threads without the engine
//! owning any threading of its own.

use std::sync::mpsc::Receiver;

use serde_json::Value;

use crate::io::wire::NodeData;
use crate::tree::{Node, NodeId};

/// Reply of a child source for one node.
pub enum SourceReply {
    /// Ready-made child records.
    Children(Vec<NodeData>),
    /// A raw payload; runs through the receive hook and the wire
    /// parser (nested or flat encoding, embedded redefinitions).
    Payload(Value),
    /// The payload will arrive later on this channel.
    Deferred(Receiver<anyhow::Result<Value>>),
    /// Explicit "this node has no children".
    NoChildren,
}

/// Supplies child data for lazy nodes.
pub trait ChildSource {
    /// Called once per load request; must not call back into the tree.
    fn fetch(&mut self, node: &Node) -> SourceReply;
}

impl<F> ChildSource for F
where
    F: FnMut(&Node) -> SourceReply,
{
    fn fetch(&mut self, node: &Node) -> SourceReply {
        self(node)
    }
}

/// An outstanding deferred load.
///
/// Superseded requests stay in the registry on purpose: their reply
/// still arrives and is then discarded by the request-id comparison,
/// which is the race protection the engine relies on.
pub(crate) struct PendingLoad {
    pub node: NodeId,
    pub request_id: u64,
    pub rx: Receiver<anyhow::Result<Value>>,
    /// Expansion flag captured at request time, restored on success.
    pub was_expanded: bool,
}
