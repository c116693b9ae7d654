//! Selection propagation engine.
//!
//! Three selection modes:
//! - `Single`: at most one selected node tree-wide.
//! - `Multi`: independent flags, with optional explicit subtree
//!   propagation.
//! - `Hier`: tri-state hierarchical selection. Changing any end node
//!   re-derives every ancestor: fully selected iff all children are,
//!   unselected iff none are, partial otherwise. Lazy nodes whose
//!   children were never loaded keep an explicitly set partial flag
//!   instead of having it recomputed from absent children.

use crate::error::TreeError;
use crate::event::TreeEvent;
use crate::render::scheduler::ChangeType;
use crate::tree::{Node, NodeId, Tree, TriState};

/// Tree-wide selection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// At most one selected node.
    Single,
    /// Independent selection flags per node.
    Multi,
    /// Tri-state hierarchical selection.
    Hier,
}

/// Options for [`Tree::set_selected`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions {
    /// Override `unselectable` and radiogroup deselect protection.
    pub force: bool,
    /// In `Multi` mode, apply the flag to the whole subtree.
    pub propagate_down: bool,
}

impl Tree {
    /// Sets a node's selection flag according to the active mode.
    ///
    /// No-ops (returning `Ok(false)`): status nodes, `unselectable`
    /// nodes without `force`, and deselecting a radiogroup child
    /// without `force`.
    ///
    /// # Returns
    /// `true` if any node's selection state changed.
    pub fn set_selected(
        &mut self,
        id: NodeId,
        flag: bool,
        opts: SelectOptions,
    ) -> Result<bool, TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        if node.is_status_node() {
            return Ok(false);
        }
        if node.unselectable && !opts.force {
            return Ok(false);
        }
        let parent = node.parent_id();

        // Radiogroup: direct children are mutually exclusive.
        if let Some(pid) = parent {
            if self.node_ref(pid).radiogroup {
                if !flag && !opts.force {
                    return Ok(false);
                }
                if flag {
                    let siblings = self.node_ref(pid).child_ids().unwrap_or(&[]).to_vec();
                    for s in siblings {
                        if s != id && self.node_ref(s).is_selected() {
                            self.write_selection(s, false, false);
                        }
                    }
                }
            }
        }

        let changed = match self.select_mode {
            SelectMode::Single => {
                if flag {
                    for other in self.selected_ids() {
                        if other != id {
                            self.write_selection(other, false, false);
                        }
                    }
                }
                self.write_selection(id, flag, false)
            }
            SelectMode::Multi => {
                let mut changed = self.write_selection(id, flag, false);
                if opts.propagate_down {
                    changed |= self.select_subtree(id, flag, opts.force);
                }
                changed
            }
            SelectMode::Hier => {
                let mut changed = self.write_selection(id, flag, false);
                changed |= self.select_subtree(id, flag, opts.force);
                self.fix_selection_up(id);
                changed
            }
        };

        if changed {
            self.emit(TreeEvent::Select {
                node: id,
                selected: flag,
            });
        }
        Ok(changed)
    }

    /// Toggles a node's selection. A partially selected node is
    /// selected if at least one selectable descendant end node is
    /// still unselected, and deselected otherwise.
    pub fn toggle_selected(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        let flag = match node.selection_state() {
            TriState::Selected => false,
            TriState::Unselected => true,
            TriState::Partial => {
                let mut any_unselected = false;
                self.visit_subtree(id, true, &mut |n: &Node| {
                    if n.is_status_node() {
                        return crate::domain::traversal::Visit::Skip;
                    }
                    let end_node = n.loaded_child_count() == 0;
                    if end_node && !n.unselectable && !n.is_selected() {
                        any_unselected = true;
                        return crate::domain::traversal::Visit::Stop;
                    }
                    crate::domain::traversal::Visit::Continue
                });
                any_unselected
            }
        };
        self.set_selected(id, flag, SelectOptions::default())
    }

    /// Ids of all selected nodes, in pre-order.
    ///
    /// With `stop_on_parents`, descendants of a selected node are not
    /// reported individually (useful in `Hier` mode, where a selected
    /// parent implies its subtree).
    pub fn get_selected(&self, stop_on_parents: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.visit(&mut |n: &Node| {
            if n.is_selected() && !n.is_status_node() {
                out.push(n.id());
                if stop_on_parents {
                    return crate::domain::traversal::Visit::Skip;
                }
            }
            crate::domain::traversal::Visit::Continue
        });
        out
    }

    fn selected_ids(&self) -> Vec<NodeId> {
        self.get_selected(false)
    }

    /// Re-derives the tri-state of every node with loaded children
    /// from its end nodes, bottom-up. Nodes without loaded children
    /// keep their flags (this is what preserves an explicit partial
    /// mark on an unloaded lazy node).
    pub fn fix_selection(&mut self) {
        for top in self.top_level_ids() {
            self.fix_selection_node(top);
        }
    }

    fn fix_selection_node(&mut self, id: NodeId) -> TriState {
        let children: Vec<NodeId> = self
            .node_ref(id)
            .child_ids()
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|&c| !self.node_ref(c).is_status_node())
            .collect();
        if children.is_empty() {
            return self.node_ref(id).selection_state();
        }
        let mut all = true;
        let mut none = true;
        for c in children {
            match self.fix_selection_node(c) {
                TriState::Selected => none = false,
                TriState::Unselected => all = false,
                TriState::Partial => {
                    all = false;
                    none = false;
                }
            }
        }
        self.write_selection(id, all, !all && !none);
        self.node_ref(id).selection_state()
    }

    /// Recomputes ancestor tri-states after `id` changed.
    fn fix_selection_up(&mut self, id: NodeId) {
        let mut p = self.node_ref(id).parent_id();
        let root = self.root_id();
        while let Some(pid) = p {
            if pid != root {
                let children: Vec<NodeId> = self
                    .node_ref(pid)
                    .child_ids()
                    .unwrap_or(&[])
                    .iter()
                    .copied()
                    .filter(|&c| !self.node_ref(c).is_status_node())
                    .collect();
                if !children.is_empty() {
                    let mut all = true;
                    let mut none = true;
                    for c in children {
                        match self.node_ref(c).selection_state() {
                            TriState::Selected => none = false,
                            TriState::Unselected => all = false,
                            TriState::Partial => {
                                all = false;
                                none = false;
                            }
                        }
                    }
                    self.write_selection(pid, all, !all && !none);
                }
            }
            p = self.node_ref(pid).parent_id();
        }
    }

    /// Applies a selection flag to all selectable descendants.
    fn select_subtree(&mut self, id: NodeId, flag: bool, force: bool) -> bool {
        let mut targets = Vec::new();
        self.visit_subtree(id, false, &mut |n: &Node| {
            if n.is_status_node() {
                return crate::domain::traversal::Visit::Skip;
            }
            if !n.unselectable || force {
                targets.push(n.id());
            }
            crate::domain::traversal::Visit::Continue
        });
        let mut changed = false;
        for t in targets {
            changed |= self.write_selection(t, flag, false);
        }
        changed
    }

    /// Writes selection flags on one node and notes the row refresh.
    fn write_selection(&mut self, id: NodeId, selected: bool, part_sel: bool) -> bool {
        let node = self.node_mut(id);
        if node.selected == selected && node.part_sel == part_sel {
            return false;
        }
        node.selected = selected;
        node.part_sel = part_sel;
        self.note_change(ChangeType::Status, Some(id));
        true
    }
}
