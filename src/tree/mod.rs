//! Tree data model: arena storage, lookup maps, and structural mutation.
//!
//! The [`Tree`] owns every [`Node`] in a flat arena keyed by [`NodeId`]
//! and maintains two incremental lookup tables: `key -> node` (unique)
//! and `ref_key -> nodes` (clone sets). Both are updated by the same
//! code paths that attach and detach nodes; they are never rebuilt by a
//! full scan outside of [`Tree::check_consistency`].
//!
//! Hierarchy invariants enforced here:
//! - exactly one invisible root; it is excluded from row enumeration
//! - a node's `parent.children` contains the node exactly once
//! - no node is its own ancestor (moves below a descendant fail fast)

mod node;

pub use node::{Node, NodeId, StatusNodeType, TriState};

use std::collections::{HashMap, HashSet};

use crate::domain::filter::{FilterMode, FilterOptions, FilterQuery};
use crate::domain::selection::SelectMode;
use crate::error::TreeError;
use crate::event::{ChildModOp, EventSink, TreeEvent};
use crate::io::source::{ChildSource, PendingLoad};
use crate::io::wire::{ColumnDef, NodeData, TypeDef};
use crate::render::scheduler::{ChangeType, UpdateScheduler};
use crate::render::RowHandle;

/// Where to attach a node relative to an anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Append as last child of the anchor.
    Child,
    /// Insert as first child of the anchor.
    FirstChild,
    /// Insert as sibling directly before the anchor.
    Before,
    /// Insert as sibling directly after the anchor.
    After,
}

/// Payload transform hook: may rewrite a raw fetched payload before the
/// engine parses it (how foreign data shapes become native).
pub type ReceiveHook = Box<dyn FnMut(NodeId, serde_json::Value) -> serde_json::Value>;

/// Hierarchical tree-grid model with windowed rendering support.
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_node_id: NodeId,
    key_seq: u64,
    pub(crate) request_seq: u64,
    pub(crate) match_seq: u32,

    key_map: HashMap<String, NodeId>,
    ref_key_map: HashMap<String, HashSet<NodeId>>,

    pub(crate) select_mode: SelectMode,
    pub(crate) filter_mode: Option<FilterMode>,
    pub(crate) last_filter: Option<(FilterQuery, FilterOptions)>,

    pub(crate) types: HashMap<String, TypeDef>,
    pub(crate) columns: Vec<ColumnDef>,

    active_node: Option<NodeId>,

    pub(crate) source: Option<Box<dyn ChildSource>>,
    pub(crate) receive: Option<ReceiveHook>,
    sink: Option<EventSink>,

    pub(crate) scheduler: UpdateScheduler,
    pub(crate) pending_loads: Vec<PendingLoad>,
    /// Nodes enumerated by the last windowing pass.
    pub(crate) view_nodes: HashSet<NodeId>,
    /// Row handles of removed nodes, to be released on the next pass.
    pub(crate) orphaned_rows: Vec<(NodeId, RowHandle)>,
}

impl Tree {
    /// Creates an empty tree holding only the invisible root.
    pub fn new() -> Self {
        let root_id: NodeId = 1;
        let mut nodes = HashMap::new();
        let mut root = Node::new(root_id, "__root__".to_string(), None);
        root.expanded = true;
        nodes.insert(root_id, root);
        Tree {
            nodes,
            root: root_id,
            next_node_id: root_id + 1,
            key_seq: 0,
            request_seq: 0,
            match_seq: 0,
            key_map: HashMap::new(),
            ref_key_map: HashMap::new(),
            select_mode: SelectMode::Multi,
            filter_mode: None,
            last_filter: None,
            types: HashMap::new(),
            columns: Vec::new(),
            active_node: None,
            source: None,
            receive: None,
            sink: None,
            scheduler: UpdateScheduler::new(),
            pending_loads: Vec::new(),
            view_nodes: HashSet::new(),
            orphaned_rows: Vec::new(),
        }
    }

    // ===== Configuration =====

    pub fn set_select_mode(&mut self, mode: SelectMode) {
        self.select_mode = mode;
    }

    pub fn select_mode(&self) -> SelectMode {
        self.select_mode
    }

    /// Installs the lazy-load child source.
    pub fn set_source(&mut self, source: Box<dyn ChildSource>) {
        self.source = Some(source);
    }

    /// Installs the receive/transform hook applied to raw payloads.
    pub fn set_receive_hook(&mut self, hook: ReceiveHook) {
        self.receive = Some(hook);
    }

    /// Installs the lifecycle event sink.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    pub fn set_columns(&mut self, columns: Vec<ColumnDef>) {
        self.columns = columns;
        self.note_change(ChangeType::Columns, None);
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    // ===== Arena access =====

    /// Returns the node for `id`, if it is still part of the tree.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// The invisible root (never a data row).
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Ids of the visible top level, in order.
    pub fn top_level_ids(&self) -> Vec<NodeId> {
        self.node_ref(self.root)
            .children
            .clone()
            .unwrap_or_default()
    }

    /// Number of nodes in the tree, excluding the invisible root.
    pub fn count(&self) -> usize {
        self.nodes.len() - 1
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> &Node {
        match self.nodes.get(&id) {
            Some(n) => n,
            None => panic!("node id {id} is not registered in the arena"),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(&id) {
            Some(n) => n,
            None => panic!("node id {id} is not registered in the arena"),
        }
    }

    // ===== Key / clone lookup =====

    /// Resolves a node by its unique key.
    pub fn find_by_key(&self, key: &str) -> Option<NodeId> {
        self.key_map.get(key).copied()
    }

    /// Returns all nodes sharing `ref_key`, in id order.
    pub fn find_by_ref_key(&self, ref_key: &str) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .ref_key_map
            .get(ref_key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// True if at least one other node shares this node's `ref_key`.
    pub fn is_clone(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        match node.ref_key() {
            Some(rk) => self
                .ref_key_map
                .get(rk)
                .map(|set| set.len() > 1)
                .unwrap_or(false),
            None => false,
        }
    }

    fn register_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        let (key, ref_key) = {
            let node = self.node_ref(id);
            (node.key.clone(), node.ref_key.clone())
        };
        if self.key_map.contains_key(&key) {
            return Err(TreeError::DuplicateKey(key));
        }
        self.key_map.insert(key, id);
        if let Some(rk) = ref_key {
            self.ref_key_map.entry(rk).or_default().insert(id);
        }
        Ok(())
    }

    fn unregister_node(&mut self, id: NodeId) {
        let (key, ref_key, handle) = {
            let node = self.node_ref(id);
            (node.key.clone(), node.ref_key.clone(), node.row_handle)
        };
        self.key_map.remove(&key);
        if let Some(rk) = ref_key {
            if let Some(set) = self.ref_key_map.get_mut(&rk) {
                set.remove(&id);
                if set.is_empty() {
                    self.ref_key_map.remove(&rk);
                }
            }
        }
        if let Some(h) = handle {
            self.orphaned_rows.push((id, h));
        }
        self.view_nodes.remove(&id);
        // Pending loads for this node stay registered; their reply is
        // discarded by the detached-node check in poll_loads().
        self.nodes.remove(&id);
    }

    // ===== Node creation =====

    /// Instantiates a node from wire data below `parent`, applying type
    /// defaults and registering it in the lookup maps. Does not attach
    /// it to the parent's child list.
    fn create_node(&mut self, parent: NodeId, data: &NodeData) -> Result<NodeId, TreeError> {
        let id = self.next_node_id;
        self.next_node_id += 1;

        let key = match &data.key {
            Some(k) => k.clone(),
            None => loop {
                self.key_seq += 1;
                let candidate = self.key_seq.to_string();
                if !self.key_map.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let type_def = data
            .node_type
            .as_ref()
            .and_then(|t| self.types.get(t))
            .cloned();

        let mut node = Node::new(id, key, Some(parent));
        node.title = data.title.clone();
        node.ref_key = data.ref_key.clone();
        node.tooltip = data.tooltip.clone();
        node.node_type = data.node_type.clone();
        node.expanded = data.expanded;
        node.selected = data.selected;
        node.lazy = data.lazy;
        node.unselectable = data.unselectable;
        node.checkbox = data.checkbox;
        node.radiogroup = data.radiogroup;
        node.colspan = data.colspan;
        node.status_node_type = data.status_node_type;
        if let Some(classes) = &data.classes {
            node.extra_classes = classes.split_whitespace().map(str::to_string).collect();
        }
        node.data = data.data.clone();

        if let Some(def) = type_def {
            if node.checkbox.is_none() {
                node.checkbox = def.checkbox;
            }
            if node.tooltip.is_none() {
                node.tooltip = def.tooltip.clone();
            }
            if let Some(true) = def.unselectable {
                node.unselectable = true;
            }
            if let Some(classes) = &def.classes {
                for c in classes.split_whitespace() {
                    if !node.extra_classes.iter().any(|e| e == c) {
                        node.extra_classes.push(c.to_string());
                    }
                }
            }
            for (k, v) in &def.data {
                node.data.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        self.nodes.insert(id, node);
        if let Err(e) = self.register_node(id) {
            self.nodes.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Adds a list of wire records (with nested children) below
    /// `parent`, optionally at a fixed child position.
    ///
    /// # Returns
    /// Ids of the directly added top-level records.
    pub fn add_children(
        &mut self,
        parent: NodeId,
        data: &[NodeData],
        insert_at: Option<usize>,
    ) -> Result<Vec<NodeId>, TreeError> {
        if !self.nodes.contains_key(&parent) {
            return Err(TreeError::UnknownNode(parent));
        }
        let mut added = Vec::with_capacity(data.len());
        for (i, d) in data.iter().enumerate() {
            let id = self.create_node(parent, d)?;
            let children = self.node_mut(parent).children.get_or_insert_with(Vec::new);
            match insert_at {
                Some(at) => children.insert((at + i).min(children.len()), id),
                None => children.push(id),
            }
            added.push(id);
            if let Some(kids) = &d.children {
                self.add_children(id, kids, None)?;
            }
        }
        self.emit(TreeEvent::ModifyChild {
            parent,
            op: ChildModOp::Add,
        });
        self.note_change(ChangeType::Structure, None);
        Ok(added)
    }

    /// Adds a single wire record relative to `anchor`.
    pub fn add_node(
        &mut self,
        anchor: NodeId,
        data: &NodeData,
        mode: InsertMode,
    ) -> Result<NodeId, TreeError> {
        let (parent, at) = self.resolve_insert(anchor, mode)?;
        let one = std::slice::from_ref(data);
        let added = self.add_children(parent, one, at)?;
        Ok(added[0])
    }

    fn resolve_insert(
        &self,
        anchor: NodeId,
        mode: InsertMode,
    ) -> Result<(NodeId, Option<usize>), TreeError> {
        let node = self.node(anchor).ok_or(TreeError::UnknownNode(anchor))?;
        match mode {
            InsertMode::Child => Ok((anchor, None)),
            InsertMode::FirstChild => Ok((anchor, Some(0))),
            InsertMode::Before | InsertMode::After => {
                let parent = node.parent.ok_or(TreeError::InvalidTarget("insert"))?;
                let pos = self.child_pos(parent, anchor);
                let at = if mode == InsertMode::Before { pos } else { pos + 1 };
                Ok((parent, Some(at)))
            }
        }
    }

    fn child_pos(&self, parent: NodeId, child: NodeId) -> usize {
        let children = self.node_ref(parent).children.as_deref().unwrap_or(&[]);
        match children.iter().position(|&c| c == child) {
            Some(pos) => pos,
            None => panic!("node {child} is missing from its parent's child list"),
        }
    }

    // ===== Removal =====

    /// Removes a node and its whole subtree from the tree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        let parent = node.parent.ok_or(TreeError::InvalidTarget("remove"))?;

        let pos = self.child_pos(parent, id);
        if let Some(children) = &mut self.node_mut(parent).children {
            children.remove(pos);
        }

        let mut doomed = Vec::new();
        self.collect_subtree(id, &mut doomed);
        if let Some(active) = self.active_node {
            if doomed.contains(&active) {
                self.active_node = None;
            }
        }
        for n in doomed {
            self.unregister_node(n);
        }

        self.emit(TreeEvent::ModifyChild {
            parent,
            op: ChildModOp::Remove,
        });
        self.note_change(ChangeType::Structure, None);
        Ok(())
    }

    /// Removes all children of a node (the node itself stays).
    pub fn remove_children(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        let children = self.node_mut(id).children.take().unwrap_or_default();
        if !children.is_empty() {
            let mut doomed = Vec::new();
            for c in &children {
                self.collect_subtree(*c, &mut doomed);
            }
            if let Some(active) = self.active_node {
                if doomed.contains(&active) {
                    self.active_node = None;
                }
            }
            for n in doomed {
                self.unregister_node(n);
            }
            self.emit(TreeEvent::ModifyChild {
                parent: id,
                op: ChildModOp::Remove,
            });
        }
        // Non-lazy nodes go back to "loaded, empty".
        if !self.node_ref(id).lazy {
            self.node_mut(id).children = Some(Vec::new());
        }
        self.note_change(ChangeType::Structure, None);
        Ok(())
    }

    /// Discards loaded children of a lazy node and collapses it, so the
    /// next expansion fetches again.
    pub fn reset_lazy(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        if !node.lazy {
            return Err(TreeError::NotLazy(id));
        }
        self.remove_children(id)?;
        let node = self.node_mut(id);
        node.children = None;
        node.expanded = false;
        Ok(())
    }

    /// Removes every node, keeping tree-wide configuration.
    pub fn clear(&mut self) {
        let top = self.top_level_ids();
        for id in top {
            // Top-level nodes always have the root as parent.
            let _ = self.remove(id);
        }
        self.node_mut(self.root).children = None;
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(children) = self.node_ref(id).child_ids() {
            for c in children.to_vec() {
                self.collect_subtree(c, out);
            }
        }
    }

    // ===== Moving =====

    /// Moves a node (with its subtree) relative to `target`.
    ///
    /// Fails fast on caller misuse: moving the root, moving a node to
    /// itself, or below one of its own descendants.
    pub fn move_to(
        &mut self,
        id: NodeId,
        target: NodeId,
        mode: InsertMode,
    ) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        if id == target {
            return Err(TreeError::InvalidTarget("move_to"));
        }
        let old_parent = self
            .node_ref(id)
            .parent
            .ok_or(TreeError::InvalidTarget("move_to"))?;
        let (new_parent, at) = self.resolve_insert(target, mode)?;
        if new_parent == id || self.is_descendant_of(new_parent, id) {
            return Err(TreeError::CyclicMove);
        }

        // Unlink from the old position first; recompute the insertion
        // index afterwards since it may have shifted.
        let old_pos = self.child_pos(old_parent, id);
        if let Some(children) = &mut self.node_mut(old_parent).children {
            children.remove(old_pos);
        }
        let at = match at {
            Some(at) if new_parent == old_parent && at > old_pos => Some(at - 1),
            other => other,
        };
        let children = self
            .node_mut(new_parent)
            .children
            .get_or_insert_with(Vec::new);
        match at {
            Some(at) => children.insert(at.min(children.len()), id),
            None => children.push(id),
        }
        self.node_mut(id).parent = Some(new_parent);

        if old_parent != new_parent {
            self.emit(TreeEvent::ModifyChild {
                parent: old_parent,
                op: ChildModOp::Remove,
            });
        }
        self.emit(TreeEvent::ModifyChild {
            parent: new_parent,
            op: ChildModOp::Move,
        });
        self.note_change(ChangeType::Structure, None);
        Ok(())
    }

    // ===== Sorting =====

    /// Sorts the children of a node, optionally recursing into the
    /// whole subtree.
    pub fn sort_children<F>(&mut self, id: NodeId, cmp: &mut F, deep: bool) -> Result<(), TreeError>
    where
        F: FnMut(&Node, &Node) -> std::cmp::Ordering,
    {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        self.sort_children_inner(id, cmp, deep);
        self.emit(TreeEvent::ModifyChild {
            parent: id,
            op: ChildModOp::Sort,
        });
        self.note_change(ChangeType::Structure, None);
        Ok(())
    }

    fn sort_children_inner<F>(&mut self, id: NodeId, cmp: &mut F, deep: bool)
    where
        F: FnMut(&Node, &Node) -> std::cmp::Ordering,
    {
        let Some(mut children) = self.node_ref(id).children.clone() else {
            return;
        };
        children.sort_by(|&a, &b| cmp(self.node_ref(a), self.node_ref(b)));
        self.node_mut(id).children = Some(children.clone());
        if deep {
            for c in children {
                self.sort_children_inner(c, cmp, deep);
            }
        }
    }

    // ===== Hierarchy queries =====

    /// Depth of a node (top-level nodes are level 1).
    pub fn get_level(&self, id: NodeId) -> usize {
        let mut level = 0;
        let mut p = self.node_ref(id).parent;
        while let Some(pid) = p {
            level += 1;
            p = self.node_ref(pid).parent;
        }
        level
    }

    /// True if `id` lies somewhere below `ancestor`.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut p = self.node(id).and_then(|n| n.parent);
        while let Some(pid) = p {
            if pid == ancestor {
                return true;
            }
            p = self.node_ref(pid).parent;
        }
        false
    }

    pub fn is_top_level(&self, id: NodeId) -> bool {
        self.node(id).and_then(|n| n.parent) == Some(self.root)
    }

    pub fn get_parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id)?.parent?;
        (parent != self.root).then_some(parent)
    }

    /// Ancestors from top-level down to (optionally) the node itself;
    /// the invisible root is never included.
    pub fn get_parent_list(&self, id: NodeId, include_self: bool) -> Vec<NodeId> {
        let mut list = Vec::new();
        if include_self && self.nodes.contains_key(&id) {
            list.push(id);
        }
        let mut p = self.node(id).and_then(|n| n.parent);
        while let Some(pid) = p {
            if pid != self.root {
                list.push(pid);
            }
            p = self.node_ref(pid).parent;
        }
        list.reverse();
        list
    }

    /// Slash-separated title path from the top level to this node.
    pub fn get_path(&self, id: NodeId) -> String {
        let titles: Vec<&str> = self
            .get_parent_list(id, true)
            .into_iter()
            .map(|n| self.node_ref(n).title.as_str())
            .collect();
        titles.join("/")
    }

    pub fn get_first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.child_ids()?.first().copied()
    }

    pub fn get_last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.child_ids()?.last().copied()
    }

    pub fn get_prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id)?.parent?;
        let pos = self.child_pos(parent, id);
        if pos == 0 {
            None
        } else {
            self.node_ref(parent).child_ids().map(|c| c[pos - 1])
        }
    }

    pub fn get_next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id)?.parent?;
        let pos = self.child_pos(parent, id);
        self.node_ref(parent)
            .child_ids()
            .and_then(|c| c.get(pos + 1))
            .copied()
    }

    /// Finds a direct child by title.
    pub fn find_direct_child(&self, parent: NodeId, title: &str) -> Option<NodeId> {
        self.node(parent)?
            .child_ids()?
            .iter()
            .copied()
            .find(|&c| self.node_ref(c).title == title)
    }

    /// Returns the first node below `scope` matching the predicate, in
    /// pre-order.
    pub fn find_first<F>(&self, scope: NodeId, mut matcher: F) -> Option<NodeId>
    where
        F: FnMut(&Node) -> bool,
    {
        let mut found = None;
        self.visit_subtree(scope, false, &mut |n: &Node| {
            if matcher(n) {
                found = Some(n.id());
                crate::domain::traversal::Visit::Stop
            } else {
                crate::domain::traversal::Visit::Continue
            }
        });
        found
    }

    /// Returns all nodes below `scope` matching the predicate.
    pub fn find_all<F>(&self, scope: NodeId, mut matcher: F) -> Vec<NodeId>
    where
        F: FnMut(&Node) -> bool,
    {
        let mut found = Vec::new();
        self.visit_subtree(scope, false, &mut |n: &Node| {
            if matcher(n) {
                found.push(n.id());
            }
            crate::domain::traversal::Visit::Continue
        });
        found
    }

    // ===== Expansion =====

    /// Expands or collapses a node.
    ///
    /// Expanding an unloaded lazy node triggers its load when a child
    /// source is installed; the expansion flag is set immediately and
    /// rows follow once the response arrives.
    pub fn set_expanded(&mut self, id: NodeId, flag: bool) -> Result<(), TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        if node.expanded == flag {
            return Ok(());
        }
        self.node_mut(id).expanded = flag;
        self.emit(if flag {
            TreeEvent::Expand { node: id }
        } else {
            TreeEvent::Collapse { node: id }
        });
        self.note_change(ChangeType::Structure, None);
        if flag && self.node_ref(id).is_unloaded() && self.source.is_some() {
            self.load_lazy(id, false)?;
        }
        Ok(())
    }

    /// Expands or collapses every node; unloaded lazy nodes start
    /// loading when expanding. Completion of those loads arrives via
    /// [`Tree::poll_loads`].
    pub fn expand_all(&mut self, flag: bool) -> Result<(), TreeError> {
        let all: Vec<NodeId> = self
            .find_all(self.root, |n| !n.is_status_node())
            .into_iter()
            .collect();
        self.run_without_update(|tree| {
            for id in all {
                if tree.node_ref(id).has_children() != Some(false) {
                    tree.set_expanded(id, flag)?;
                }
            }
            Ok(())
        })
    }

    // ===== Active node =====

    pub fn active_node(&self) -> Option<NodeId> {
        self.active_node
    }

    /// Makes `id` the active node, notifying the previous one.
    pub fn set_active(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        if self.active_node == Some(id) {
            return Ok(());
        }
        if let Some(prev) = self.active_node.take() {
            self.emit(TreeEvent::Deactivate { node: prev });
            self.note_change(ChangeType::Status, Some(prev));
        }
        self.active_node = Some(id);
        self.emit(TreeEvent::Activate { node: id });
        self.note_change(ChangeType::Status, Some(id));
        Ok(())
    }

    /// Renames a node (title only; keys are immutable).
    pub fn set_title(&mut self, id: NodeId, title: &str) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        self.node_mut(id).title = title.to_string();
        self.note_change(ChangeType::Status, Some(id));
        Ok(())
    }

    // ===== Events / scheduling plumbing =====

    pub(crate) fn emit(&mut self, event: TreeEvent) {
        if let Some(mut sink) = self.sink.take() {
            sink(&event);
            self.sink = Some(sink);
        }
    }

    pub(crate) fn note_change(&mut self, change: ChangeType, node: Option<NodeId>) {
        self.scheduler.note(change, node);
    }

    // ===== Consistency =====

    /// Debug aid: verifies arena, child-list and lookup-map invariants
    /// by full scan. Never called from hot paths.
    pub fn check_consistency(&self) -> bool {
        let mut ok = true;
        let mut seen = 0usize;
        for (id, node) in &self.nodes {
            if let Some(parent) = node.parent {
                let occurrences = self
                    .node_ref(parent)
                    .child_ids()
                    .map(|c| c.iter().filter(|&&c| c == *id).count())
                    .unwrap_or(0);
                if occurrences != 1 {
                    tracing::warn!(node = id, parent, occurrences, "broken parent link");
                    ok = false;
                }
                if self.is_descendant_of(parent, *id) {
                    tracing::warn!(node = id, "cycle detected");
                    ok = false;
                }
            } else if *id != self.root {
                tracing::warn!(node = id, "non-root node without parent");
                ok = false;
            }
            if *id != self.root {
                seen += 1;
                if self.key_map.get(&node.key) != Some(id) {
                    tracing::warn!(node = id, key = %node.key, "key map out of sync");
                    ok = false;
                }
            }
        }
        if seen != self.key_map.len() {
            tracing::warn!(
                nodes = seen,
                keys = self.key_map.len(),
                "key map size mismatch"
            );
            ok = false;
        }
        for (rk, set) in &self.ref_key_map {
            for id in set {
                if self.node(*id).and_then(|n| n.ref_key()) != Some(rk.as_str()) {
                    tracing::warn!(node = id, ref_key = %rk, "ref key map out of sync");
                    ok = false;
                }
            }
        }
        ok
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
