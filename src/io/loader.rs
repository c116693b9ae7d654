//! Lazy-load coordinator.
//!
//! Per-node load state machine: `unloaded -> loading -> {ok | error}`,
//! where "ok with empty children" is distinguishable from "unloaded".
//! Every request gets a tree-wide monotonically increasing id; the node
//! keeps only the newest. When a reply arrives, it is discarded if the
//! node's current request id no longer matches the one captured at
//! request time, or if the node has been detached in the meantime.
//! That comparison (not any network-level abort) is what makes
//! overlapping reloads safe.

use serde_json::Value;

use crate::error::TreeError;
use crate::event::TreeEvent;
use crate::io::source::{PendingLoad, SourceReply};
use crate::io::wire::{parse_payload, SourcePayload};
use crate::render::scheduler::ChangeType;
use crate::tree::{NodeId, StatusNodeType, Tree};

/// Node status facade used by [`Tree::set_status`] (`Ok` clears any
/// transient status node; the others install one where applicable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Ok,
    Loading,
    Error,
    NoData,
}

impl Tree {
    /// Loads the tree's top level from a raw payload (initial bulk
    /// load). Existing content is cleared first.
    ///
    /// # Returns
    /// Ids of the added top-level nodes.
    pub fn load(&mut self, payload: Value) -> Result<Vec<NodeId>, TreeError> {
        self.clear();
        let root = self.root_id();
        self.apply_payload(root, payload)
    }

    /// Starts loading children of a lazy node.
    ///
    /// No-op when the node is already loaded and `force_reload` is not
    /// set. A forced reload discards current children first (and
    /// restores the expansion flag once the new children arrive).
    /// Calling again while a request is pending supersedes it: the node
    /// keeps only the newest request id and the older reply will be
    /// dropped on arrival.
    pub fn load_lazy(&mut self, id: NodeId, force_reload: bool) -> Result<(), TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        if !node.lazy {
            return Err(TreeError::NotLazy(id));
        }
        if !force_reload && node.is_loaded() {
            return Ok(());
        }
        let was_expanded = node.expanded;
        if force_reload && node.is_loaded() {
            self.reset_lazy(id)?;
        }

        self.request_seq += 1;
        let request_id = self.request_seq;
        {
            let node = self.node_mut(id);
            if node.load_seq != 0 {
                tracing::warn!(
                    node = id,
                    pending = node.load_seq,
                    superseding = request_id,
                    "new load request while another is pending"
                );
            }
            node.load_seq = request_id;
        }
        self.set_status(id, NodeStatus::Loading, None);

        let Some(mut source) = self.source.take() else {
            tracing::warn!(node = id, "load_lazy: no child source installed");
            let node = self.node_mut(id);
            node.load_seq = 0;
            node.is_loading = false;
            return Ok(());
        };
        let reply = source.fetch(self.node_ref(id));
        self.source = Some(source);

        match reply {
            SourceReply::Children(children) => {
                self.finish_load(
                    id,
                    request_id,
                    SourcePayload {
                        children,
                        ..SourcePayload::default()
                    },
                    was_expanded,
                );
            }
            SourceReply::Payload(value) => {
                self.complete_load(id, request_id, Ok(value), was_expanded);
            }
            SourceReply::NoChildren => {
                self.set_status(id, NodeStatus::Ok, None);
                let node = self.node_mut(id);
                node.children = Some(Vec::new());
                node.load_seq = 0;
                self.emit(TreeEvent::Load { node: id });
                self.note_change(ChangeType::Structure, None);
            }
            SourceReply::Deferred(rx) => {
                self.pending_loads.push(PendingLoad {
                    node: id,
                    request_id,
                    rx,
                    was_expanded,
                });
            }
        }
        Ok(())
    }

    /// Drains deferred load replies. Call once per host tick.
    ///
    /// # Returns
    /// Number of replies taken off their channels (applied *or*
    /// discarded as stale).
    pub fn poll_loads(&mut self) -> usize {
        use std::sync::mpsc::TryRecvError;

        let pending = std::mem::take(&mut self.pending_loads);
        let mut keep = Vec::new();
        let mut processed = 0;
        for p in pending {
            match p.rx.try_recv() {
                Ok(result) => {
                    processed += 1;
                    self.complete_load(p.node, p.request_id, result, p.was_expanded);
                }
                Err(TryRecvError::Empty) => keep.push(p),
                Err(TryRecvError::Disconnected) => {
                    processed += 1;
                    self.complete_load(
                        p.node,
                        p.request_id,
                        Err(anyhow::anyhow!("child source dropped the reply channel")),
                        p.was_expanded,
                    );
                }
            }
        }
        keep.extend(self.pending_loads.drain(..));
        self.pending_loads = keep;
        processed
    }

    /// True while any deferred load reply is outstanding. Batch
    /// operations (expand-all) are complete once this turns false.
    pub fn has_pending_loads(&self) -> bool {
        !self.pending_loads.is_empty()
    }

    /// Applies a load reply, or discards it when stale.
    fn complete_load(
        &mut self,
        id: NodeId,
        request_id: u64,
        result: anyhow::Result<Value>,
        was_expanded: bool,
    ) {
        let Some(node) = self.node(id) else {
            tracing::warn!(
                node = id,
                request_id,
                "node was removed while loading: discarding response"
            );
            return;
        };
        if node.load_seq != request_id {
            tracing::warn!(
                node = id,
                request_id,
                current = node.load_seq,
                "ignoring superseded load response"
            );
            return;
        }
        match result {
            Ok(value) => {
                let value = match self.receive.take() {
                    Some(mut hook) => {
                        let v = hook(id, value);
                        self.receive = Some(hook);
                        v
                    }
                    None => value,
                };
                match parse_payload(value) {
                    Ok(payload) => self.finish_load(id, request_id, payload, was_expanded),
                    Err(e) => self.fail_load(id, &e.to_string()),
                }
            }
            Err(e) => self.fail_load(id, &e.to_string()),
        }
    }

    /// Instantiates loaded children and fires the `load` notification.
    fn finish_load(
        &mut self,
        id: NodeId,
        request_id: u64,
        payload: SourcePayload,
        was_expanded: bool,
    ) {
        tracing::debug!(node = id, request_id, "load response applied");
        self.set_status(id, NodeStatus::Ok, None);

        if let Some(columns) = payload.columns {
            if id == self.root_id() {
                tracing::info!("re-defining columns from load response");
                self.columns = columns;
                self.note_change(ChangeType::Columns, None);
            } else {
                tracing::warn!(node = id, "ignoring column redefinition on a non-root load");
            }
        }
        for (name, def) in payload.types {
            self.types.insert(name, def);
        }

        let added = self.run_without_update(|tree| {
            tree.node_mut(id).children.get_or_insert_with(Vec::new);
            tree.add_children(id, &payload.children, None)
        });
        match added {
            Ok(_) => {
                let node = self.node_mut(id);
                node.load_seq = 0;
                if was_expanded {
                    node.expanded = true;
                }
                self.emit(TreeEvent::Load { node: id });
            }
            Err(e) => self.fail_load(id, &e.to_string()),
        }
    }

    /// Installs an error status node and fires the `error` notification.
    fn fail_load(&mut self, id: NodeId, message: &str) {
        tracing::error!(node = id, message, "load failed");
        self.set_status(id, NodeStatus::Error, Some(message));
        self.node_mut(id).load_seq = 0;
        self.emit(TreeEvent::LoadError {
            node: id,
            message: message.to_string(),
        });
    }

    /// Decodes and applies a raw payload below `parent` (used by both
    /// the initial bulk load and tests that bypass a child source).
    pub(crate) fn apply_payload(
        &mut self,
        parent: NodeId,
        payload: Value,
    ) -> Result<Vec<NodeId>, TreeError> {
        let payload = match self.receive.take() {
            Some(mut hook) => {
                let v = hook(parent, payload);
                self.receive = Some(hook);
                v
            }
            None => payload,
        };
        let parsed = parse_payload(payload)?;
        if let Some(columns) = parsed.columns {
            if parent == self.root_id() {
                self.columns = columns;
                self.note_change(ChangeType::Columns, None);
            } else {
                tracing::warn!(node = parent, "ignoring column redefinition on a non-root load");
            }
        }
        for (name, def) in parsed.types {
            self.types.insert(name, def);
        }
        let added =
            self.run_without_update(|tree| tree.add_children(parent, &parsed.children, None))?;
        self.emit(TreeEvent::Load { node: parent });
        Ok(added)
    }

    /// Shows a node status using flags and a transient first-child
    /// status node ('loading' rows are only materialized for the root;
    /// regular nodes indicate loading through their expander).
    ///
    /// # Returns
    /// The id of the installed status node, if one was created.
    pub fn set_status(
        &mut self,
        id: NodeId,
        status: NodeStatus,
        message: Option<&str>,
    ) -> Option<NodeId> {
        self.node(id)?;
        // Remove a previous status node first; there is at most one
        // and it is always the first child.
        let first = self.node_ref(id).child_ids().and_then(|c| c.first().copied());
        if let Some(f) = first {
            if self.node_ref(f).is_status_node() {
                let _ = self.remove(f);
            }
        }

        match status {
            NodeStatus::Ok => {
                let node = self.node_mut(id);
                node.is_loading = false;
                node.error_info = None;
                self.note_change(ChangeType::Status, Some(id));
                None
            }
            NodeStatus::Loading => {
                {
                    let node = self.node_mut(id);
                    node.is_loading = true;
                    node.error_info = None;
                }
                self.note_change(ChangeType::Status, Some(id));
                if id == self.root_id() {
                    self.install_status_node(
                        id,
                        StatusNodeType::Loading,
                        message.unwrap_or("Loading..."),
                    )
                } else {
                    None
                }
            }
            NodeStatus::Error => {
                {
                    let node = self.node_mut(id);
                    node.is_loading = false;
                    node.error_info = Some(message.unwrap_or("unknown error").to_string());
                }
                self.install_status_node(
                    id,
                    StatusNodeType::Error,
                    &format!("Load error ({})", message.unwrap_or("unknown")),
                )
            }
            NodeStatus::NoData => {
                {
                    let node = self.node_mut(id);
                    node.is_loading = false;
                    node.error_info = None;
                }
                self.install_status_node(id, StatusNodeType::NoData, message.unwrap_or("No data"))
            }
        }
    }

    fn install_status_node(
        &mut self,
        parent: NodeId,
        status: StatusNodeType,
        title: &str,
    ) -> Option<NodeId> {
        let data = crate::io::wire::NodeData {
            title: title.to_string(),
            status_node_type: Some(status),
            checkbox: Some(false),
            colspan: true,
            ..crate::io::wire::NodeData::default()
        };
        match self.add_node(parent, &data, crate::tree::InsertMode::FirstChild) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(parent, error = %e, "failed to install status node");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::SourceReply;
    use crate::io::wire::NodeData;
    use crate::tree::InsertMode;
    use serde_json::json;
    use std::sync::mpsc::channel;

    fn lazy_node(tree: &mut Tree, title: &str) -> NodeId {
        let d = NodeData {
            title: title.to_string(),
            lazy: true,
            ..NodeData::default()
        };
        let root = tree.root_id();
        tree.add_node(root, &d, InsertMode::Child).unwrap()
    }

    #[test]
    fn test_initial_bulk_load() {
        let mut tree = Tree::new();
        tree.load(json!([
            {"title": "Node 1", "expanded": true, "children": [
                {"title": "Node 1.1"}, {"title": "Node 1.2"}
            ]},
            {"title": "Node 2", "lazy": true}
        ]))
        .unwrap();
        assert_eq!(tree.count(), 4);
        let titles: Vec<String> = tree
            .row_order()
            .iter()
            .map(|&id| tree.node(id).unwrap().title.clone())
            .collect();
        assert_eq!(titles, ["Node 1", "Node 1.1", "Node 1.2", "Node 2"]);
    }

    #[test]
    fn test_immediate_children_reply() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        tree.set_source(Box::new(|_: &crate::tree::Node| {
            SourceReply::Children(vec![NodeData {
                title: "child".to_string(),
                ..NodeData::default()
            }])
        }));
        tree.load_lazy(n, false).unwrap();
        assert_eq!(tree.node(n).unwrap().has_children(), Some(true));
        assert!(!tree.has_pending_loads());
    }

    #[test]
    fn test_no_children_reply_marks_loaded_empty() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        tree.set_source(Box::new(|_: &crate::tree::Node| SourceReply::NoChildren));
        tree.load_lazy(n, false).unwrap();
        assert_eq!(tree.node(n).unwrap().has_children(), Some(false));
        assert!(tree.node(n).unwrap().is_loaded());
        // Loaded-empty is sticky: a second non-forced load is a no-op.
        tree.load_lazy(n, false).unwrap();
        assert!(!tree.has_pending_loads());
    }

    #[test]
    fn test_deferred_load_and_poll() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        let (tx, rx) = channel();
        let mut slot = Some(rx);
        tree.set_source(Box::new(move |_: &crate::tree::Node| {
            SourceReply::Deferred(slot.take().expect("single fetch expected"))
        }));
        tree.load_lazy(n, false).unwrap();
        assert!(tree.has_pending_loads());
        assert!(tree.node(n).unwrap().is_loading());
        assert_eq!(tree.poll_loads(), 0, "nothing resolved yet");

        tx.send(Ok(json!([{"title": "late child"}]))).unwrap();
        assert_eq!(tree.poll_loads(), 1);
        assert_eq!(tree.node(n).unwrap().has_children(), Some(true));
        assert!(!tree.node(n).unwrap().is_loading());
    }

    #[test]
    fn test_stale_response_discarded() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();
        let mut replies = vec![rx2, rx1];
        tree.set_source(Box::new(move |_: &crate::tree::Node| {
            SourceReply::Deferred(replies.pop().expect("two fetches expected"))
        }));

        tree.load_lazy(n, false).unwrap();
        tree.load_lazy(n, true).unwrap();

        // Resolve the first request *after* the second one: its reply
        // must be discarded by the request-id comparison.
        tx2.send(Ok(json!([{"title": "second"}]))).unwrap();
        tx1.send(Ok(json!([{"title": "first"}]))).unwrap();
        assert_eq!(tree.poll_loads(), 2);

        let children = tree.node(n).unwrap().child_ids().unwrap().to_vec();
        assert_eq!(children.len(), 1);
        assert_eq!(tree.node(children[0]).unwrap().title, "second");
    }

    #[test]
    fn test_error_installs_status_node() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        let (tx, rx) = channel();
        let mut slot = Some(rx);
        tree.set_source(Box::new(move |_: &crate::tree::Node| {
            SourceReply::Deferred(slot.take().expect("single fetch expected"))
        }));
        tree.load_lazy(n, false).unwrap();
        tx.send(Err(anyhow::anyhow!("backend unreachable"))).unwrap();
        tree.poll_loads();

        let node = tree.node(n).unwrap();
        assert_eq!(node.error_info(), Some("backend unreachable"));
        let first = tree.get_first_child(n).unwrap();
        assert_eq!(
            tree.node(first).unwrap().status_node_type(),
            Some(StatusNodeType::Error)
        );
        // Recovery: a successful reload clears the error status node.
        tree.set_source(Box::new(|_: &crate::tree::Node| {
            SourceReply::Children(vec![NodeData {
                title: "recovered".to_string(),
                ..NodeData::default()
            }])
        }));
        tree.load_lazy(n, true).unwrap();
        let children = tree.node(n).unwrap().child_ids().unwrap().to_vec();
        assert_eq!(children.len(), 1);
        assert_eq!(tree.node(children[0]).unwrap().title, "recovered");
        assert_eq!(tree.node(n).unwrap().error_info(), None);
    }

    #[test]
    fn test_response_for_removed_node_discarded() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        let (tx, rx) = channel();
        let mut slot = Some(rx);
        tree.set_source(Box::new(move |_: &crate::tree::Node| {
            SourceReply::Deferred(slot.take().expect("single fetch expected"))
        }));
        tree.load_lazy(n, false).unwrap();
        tree.remove(n).unwrap();
        tx.send(Ok(json!([{"title": "too late"}]))).unwrap();
        assert_eq!(tree.poll_loads(), 1);
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn test_receive_hook_transforms_payload() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        tree.set_receive_hook(Box::new(|_, raw| {
            // Foreign shape: {"items": [...]} instead of a child array.
            let items = raw.get("items").cloned().unwrap_or(json!([]));
            items
        }));
        tree.set_source(Box::new(|_: &crate::tree::Node| {
            SourceReply::Payload(json!({"items": [{"title": "converted"}]}))
        }));
        tree.load_lazy(n, false).unwrap();
        let children = tree.node(n).unwrap().child_ids().unwrap().to_vec();
        assert_eq!(tree.node(children[0]).unwrap().title, "converted");
    }

    #[test]
    fn test_types_merged_from_payload() {
        let mut tree = Tree::new();
        tree.load(json!({
            "types": {"folder": {"checkbox": false}},
            "children": [{"title": "a", "type": "folder"}]
        }))
        .unwrap();
        assert!(tree.type_def("folder").is_some());
    }

    #[test]
    fn test_expand_triggers_lazy_load() {
        let mut tree = Tree::new();
        let n = lazy_node(&mut tree, "lazy");
        tree.set_source(Box::new(|_: &crate::tree::Node| {
            SourceReply::Children(vec![NodeData {
                title: "auto".to_string(),
                ..NodeData::default()
            }])
        }));
        tree.set_expanded(n, true).unwrap();
        assert_eq!(tree.node(n).unwrap().has_children(), Some(true));
        assert!(tree.node(n).unwrap().expanded);
    }
}
