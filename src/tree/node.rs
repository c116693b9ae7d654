//! Node records stored in the tree arena.
//!
//! Nodes are owned by [`crate::Tree`] and addressed through opaque
//! [`NodeId`] handles; hierarchy links (`parent`, `children`) are id
//! lists into the same arena. Everything that is derived bookkeeping
//! (filter marks, load sequence, render identity) lives here as crate
//! private state mutated by the respective engine module.

use serde::{Deserialize, Serialize};

use crate::render::RowHandle;

/// Opaque arena handle for a node (unique for the lifetime of a tree).
pub type NodeId = u64;

/// Kind of a synthetic, non-data placeholder row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusNodeType {
    /// Children are currently being fetched.
    Loading,
    /// The last fetch failed; the title carries the error message.
    Error,
    /// A filter or load produced an empty result.
    NoData,
    /// More results are available (placeholder for paged sources).
    Paging,
}

/// Derived tri-state selection value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Selected,
    Unselected,
    /// Some, but not all, descendants are selected.
    Partial,
}

/// A single tree node.
///
/// Display attributes (`title`, `tooltip`, flag fields) are public and
/// freely writable; hierarchy and selection/filter bookkeeping are
/// mutated only through [`crate::Tree`] operations so the tree-wide
/// invariants (lookup maps, tri-state consistency, row identity) hold.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) key: String,
    pub(crate) ref_key: Option<String>,
    pub(crate) parent: Option<NodeId>,
    /// `None` = children unknown (lazy, not yet loaded);
    /// `Some(empty)` = loaded, no children.
    pub(crate) children: Option<Vec<NodeId>>,

    pub title: String,
    pub tooltip: Option<String>,
    /// Type tag into the tree-wide type definitions.
    pub node_type: Option<String>,
    /// Extra style classes for the row host.
    pub extra_classes: Vec<String>,
    /// Open bag of caller-defined data fields.
    pub data: serde_json::Map<String, serde_json::Value>,

    pub expanded: bool,
    pub lazy: bool,
    pub unselectable: bool,
    /// `None` = inherit from type definition / tree default.
    pub checkbox: Option<bool>,
    /// Direct children of this node are mutually exclusive.
    pub radiogroup: bool,
    /// The first cell spans all columns (used by status nodes).
    pub colspan: bool,
    pub(crate) status_node_type: Option<StatusNodeType>,

    pub(crate) selected: bool,
    pub(crate) part_sel: bool,

    /// 1-based order in which the active filter matched this node.
    pub(crate) match_rank: Option<u32>,
    /// Number of matching descendants.
    pub(crate) sub_match_count: u32,
    /// Byte ranges of `title` matched by the active filter.
    pub(crate) match_spans: Vec<(usize, usize)>,
    pub(crate) filter_auto_expanded: bool,

    /// Id of the newest outstanding load request (0 = none).
    pub(crate) load_seq: u64,
    pub(crate) is_loading: bool,
    pub(crate) error_info: Option<String>,

    /// Last assigned visible-row position, if any.
    pub(crate) row_idx: Option<usize>,
    /// Render identity issued by the row host, if currently rendered.
    pub(crate) row_handle: Option<RowHandle>,
}

impl Node {
    pub(crate) fn new(id: NodeId, key: String, parent: Option<NodeId>) -> Self {
        Node {
            id,
            key,
            ref_key: None,
            parent,
            children: None,
            title: String::new(),
            tooltip: None,
            node_type: None,
            extra_classes: Vec::new(),
            data: serde_json::Map::new(),
            expanded: false,
            lazy: false,
            unselectable: false,
            checkbox: None,
            radiogroup: false,
            colspan: false,
            status_node_type: None,
            selected: false,
            part_sel: false,
            match_rank: None,
            sub_match_count: 0,
            match_spans: Vec::new(),
            filter_auto_expanded: false,
            load_seq: 0,
            is_loading: false,
            error_info: None,
            row_idx: None,
            row_handle: None,
        }
    }

    // ===== Identity =====

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Tree-unique key (auto-generated if the source data had none).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional non-unique reference key; nodes sharing one are clones
    /// of the same logical entity.
    pub fn ref_key(&self) -> Option<&str> {
        self.ref_key.as_deref()
    }

    // ===== Hierarchy =====

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids, or `None` while children are not yet determined.
    pub fn child_ids(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    /// Return whether this node has children.
    ///
    /// # Returns
    /// `None` if not sure, i.e. the node is lazy and not yet loaded
    /// (or only holds a transient status node).
    pub fn has_children(&self) -> Option<bool> {
        if self.lazy {
            return match &self.children {
                None => None,
                Some(c) if c.is_empty() => Some(false),
                // A lone status child means "currently loading or failed".
                Some(c) if c.len() == 1 && self.is_loading => None,
                Some(_) => Some(true),
            };
        }
        Some(self.children.as_ref().map(|c| !c.is_empty()).unwrap_or(false))
    }

    /// True for a lazy node whose children were never fetched.
    pub fn is_unloaded(&self) -> bool {
        self.lazy && self.children.is_none()
    }

    /// True when children are known (non-lazy nodes are always loaded).
    pub fn is_loaded(&self) -> bool {
        !self.lazy || self.children.is_some()
    }

    // ===== Status =====

    /// True if this is a temporarily generated system row like
    /// 'loading' or 'error'.
    pub fn is_status_node(&self) -> bool {
        self.status_node_type.is_some()
    }

    pub fn is_paging_node(&self) -> bool {
        self.status_node_type == Some(StatusNodeType::Paging)
    }

    pub fn status_node_type(&self) -> Option<StatusNodeType> {
        self.status_node_type
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Message of the last failed load, if an error status is shown.
    pub fn error_info(&self) -> Option<&str> {
        self.error_info.as_deref()
    }

    // ===== Selection =====

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Derived tri-state: selected, unselected, or partially selected.
    pub fn selection_state(&self) -> TriState {
        if self.selected {
            TriState::Selected
        } else if self.part_sel {
            TriState::Partial
        } else {
            TriState::Unselected
        }
    }

    // ===== Filter =====

    /// 1-based match order assigned by the active filter, if matched.
    pub fn match_rank(&self) -> Option<u32> {
        self.match_rank
    }

    pub fn sub_match_count(&self) -> u32 {
        self.sub_match_count
    }

    /// Byte ranges of `title` to highlight for the active filter.
    pub fn match_spans(&self) -> &[(usize, usize)] {
        &self.match_spans
    }

    // ===== Rendering =====

    /// Row position assigned by the last windowing pass, if enumerated.
    pub fn row_idx(&self) -> Option<usize> {
        self.row_idx
    }

    pub fn loaded_child_count(&self) -> usize {
        self.children.as_ref().map(Vec::len).unwrap_or(0)
    }
}
