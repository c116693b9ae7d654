//! Tree traversal engine.
//!
//! Two traversal orders drive everything else:
//!
//! - [`Tree::visit_subtree`]: pre-order depth-first over the *full*
//!   subtree, regardless of expansion or filter state.
//! - [`Tree::visit_rows`]: "visible row order", i.e. depth-first
//!   limited to expanded nodes (and, while a hide-filter is active,
//!   to nodes with a match or matching descendants). Supports forward
//!   and reverse iteration from an arbitrary start node, plus a
//!   wrap-around mode for cyclic search.
//!
//! The forward and reverse row walks are two dedicated algorithms, not
//! one generalized bidirectional walk; for any fixed tree state they
//! must enumerate the same node set in exactly mirrored order (covered
//! by tests here and in `tests/integration_test.rs`).

use crate::domain::filter::FilterMode;
use crate::tree::{Node, NodeId, Tree};

/// Traversal control signal returned by visit callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep going.
    Continue,
    /// Skip the current node's children only.
    Skip,
    /// Stop the whole traversal.
    Stop,
}

/// Options for [`Tree::visit_rows`].
#[derive(Debug, Clone, Copy)]
pub struct RowScan {
    /// Node to start from (default: first top-level node).
    pub start: Option<NodeId>,
    /// Walk bottom-up instead of top-down.
    pub reverse: bool,
    /// Visit the start node itself (default true).
    pub include_self: bool,
    /// Ignore expansion and filter state (enumerate everything).
    pub include_hidden: bool,
    /// Continue past the last row back to the first, stopping once the
    /// start node is revisited. Requires `start`; forward only.
    pub wrap: bool,
}

impl Default for RowScan {
    fn default() -> Self {
        RowScan {
            start: None,
            reverse: false,
            include_self: true,
            include_hidden: false,
            wrap: false,
        }
    }
}

impl Tree {
    /// Calls `f` for every node in pre-order (depth-first), starting
    /// below the invisible root.
    ///
    /// # Returns
    /// `false` if the iteration was stopped.
    pub fn visit<F>(&self, f: &mut F) -> bool
    where
        F: FnMut(&Node) -> Visit,
    {
        self.visit_subtree(self.root_id(), false, f) != Visit::Stop
    }

    /// Calls `f` for all nodes of a subtree in pre-order.
    ///
    /// `Visit::Stop` aborts the whole traversal, `Visit::Skip` skips
    /// the current node's children only.
    ///
    /// # Returns
    /// The last non-continuing signal (`Stop` if aborted, `Skip` if the
    /// start node pruned itself, `Continue` otherwise).
    pub fn visit_subtree<F>(&self, id: NodeId, include_self: bool, f: &mut F) -> Visit
    where
        F: FnMut(&Node) -> Visit,
    {
        if include_self {
            match f(self.node_ref(id)) {
                Visit::Continue => {}
                other => return other,
            }
        }
        if let Some(children) = self.node_ref(id).child_ids().map(<[NodeId]>::to_vec) {
            for c in children {
                if self.visit_subtree(c, true, f) == Visit::Stop {
                    return Visit::Stop;
                }
            }
        }
        Visit::Continue
    }

    /// Calls `f` for all ancestors, bottom-up, including the invisible
    /// root.
    ///
    /// # Returns
    /// `false` if the iteration was stopped.
    pub fn visit_parents<F>(&self, id: NodeId, include_self: bool, f: &mut F) -> bool
    where
        F: FnMut(&Node) -> Visit,
    {
        if include_self && f(self.node_ref(id)) == Visit::Stop {
            return false;
        }
        let mut p = self.node_ref(id).parent_id();
        while let Some(pid) = p {
            if f(self.node_ref(pid)) == Visit::Stop {
                return false;
            }
            p = self.node_ref(pid).parent_id();
        }
        true
    }

    /// Calls `f` for all siblings of a node, in order.
    pub fn visit_siblings<F>(&self, id: NodeId, include_self: bool, f: &mut F) -> bool
    where
        F: FnMut(&Node) -> Visit,
    {
        let Some(parent) = self.node_ref(id).parent_id() else {
            return true;
        };
        let siblings = self.node_ref(parent).child_ids().unwrap_or(&[]).to_vec();
        for s in siblings {
            if include_self || s != id {
                if f(self.node_ref(s)) == Visit::Stop {
                    return false;
                }
            }
        }
        true
    }

    /// Calls `f` for all nodes in vertical order, top-down (or
    /// bottom-up with `scan.reverse`).
    ///
    /// # Arguments
    /// * `f` - callback; `Visit::Stop` cancels the walk. `Visit::Skip`
    ///   has no meaning here (row order already prunes collapsed and
    ///   filtered-out branches).
    /// * `scan` - see [`RowScan`].
    ///
    /// # Returns
    /// `false` if the iteration was canceled (including the wrap-around
    /// case of arriving back at the start node).
    pub fn visit_rows<F>(&self, f: &mut F, scan: RowScan) -> bool
    where
        F: FnMut(&Node) -> Visit,
    {
        let root = self.root_id();
        let Some(first_top) = self.get_first_child(root) else {
            return false;
        };
        if scan.reverse {
            return self.visit_rows_up(f, scan);
        }

        let include_hidden = scan.include_hidden;
        let check_filter = !include_hidden && self.filter_mode == Some(FilterMode::Hide);
        let mut skip_first = !scan.include_self;
        let mut node = scan.start.unwrap_or(first_top);
        let mut stop_node: Option<NodeId> = None;
        let mut wrap = scan.wrap;
        let mut sibling_ofs = 0usize;
        let mut restart = false;
        let mut parent_opt = self.node_ref(node).parent_id();

        while let Some(parent) = parent_opt {
            let siblings = self.node_ref(parent).child_ids().unwrap_or(&[]).to_vec();
            let next_idx = if restart {
                restart = false;
                0
            } else {
                let pos = match siblings.iter().position(|&s| s == node) {
                    Some(pos) => pos,
                    None => panic!("node {node} is missing from its parent's child list"),
                };
                pos + sibling_ofs
            };

            for &sibling in siblings.iter().skip(next_idx) {
                node = sibling;
                if Some(node) == stop_node {
                    return false;
                }
                {
                    let n = self.node_ref(node);
                    if check_filter && self.hidden_by_filter(n) {
                        continue;
                    }
                    if !skip_first && f(n) == Visit::Stop {
                        return false;
                    }
                }
                skip_first = false;

                // Dive into the node's children.
                let n = self.node_ref(node);
                if n.loaded_child_count() > 0 && (include_hidden || n.expanded) {
                    let res = self.visit_subtree(node, false, &mut |c: &Node| {
                        if Some(c.id()) == stop_node {
                            return Visit::Stop;
                        }
                        if check_filter && self.hidden_by_filter(c) {
                            return Visit::Skip;
                        }
                        if f(c) == Visit::Stop {
                            return Visit::Stop;
                        }
                        if !include_hidden && c.loaded_child_count() > 0 && !c.expanded {
                            return Visit::Skip;
                        }
                        Visit::Continue
                    });
                    if res == Visit::Stop {
                        return false;
                    }
                }
            }

            // Climb to the parent level and continue after it.
            node = parent;
            parent_opt = self.node_ref(parent).parent_id();
            sibling_ofs = 1;

            if parent_opt.is_none() && wrap {
                tracing::debug!("visit_rows: wrap around");
                debug_assert!(scan.start.is_some(), "`wrap` requires a start node");
                stop_node = scan.start;
                wrap = false;
                restart = true;
                parent_opt = Some(root);
                sibling_ofs = 0;
            }
        }
        true
    }

    /// Bottom-up row walk; dedicated inverse of the forward algorithm.
    fn visit_rows_up<F>(&self, f: &mut F, scan: RowScan) -> bool
    where
        F: FnMut(&Node) -> Visit,
    {
        let include_hidden = scan.include_hidden;
        let root = self.root_id();
        let Some(first_top) = self.get_first_child(root) else {
            return false;
        };
        let mut node = scan.start.unwrap_or(first_top);

        if scan.include_self && (include_hidden || self.is_row_visible(node)) {
            if f(self.node_ref(node)) == Visit::Stop {
                return false;
            }
        }

        loop {
            let Some(parent) = self.node_ref(node).parent_id() else {
                break;
            };
            let children = self.node_ref(parent).child_ids().unwrap_or(&[]).to_vec();

            if children.first() == Some(&node) {
                // Already the first sibling: go to the parent.
                node = parent;
                if self.node_ref(node).parent_id().is_none() {
                    break; // first node of the tree
                }
            } else {
                // Otherwise go to the previous sibling, then follow
                // down to its last visible descendant.
                let idx = match children.iter().position(|&c| c == node) {
                    Some(idx) => idx,
                    None => panic!("node {node} is missing from its parent's child list"),
                };
                node = children[idx - 1];
                loop {
                    let n = self.node_ref(node);
                    if (include_hidden || n.expanded) && n.loaded_child_count() > 0 {
                        node = match n.child_ids().and_then(<[NodeId]>::last) {
                            Some(&last) => last,
                            None => break,
                        };
                    } else {
                        break;
                    }
                }
            }
            if !include_hidden && !self.is_row_visible(node) {
                continue;
            }
            if f(self.node_ref(node)) == Visit::Stop {
                return false;
            }
        }
        true
    }

    /// True when a hide-filter is active and this node neither matches
    /// nor has matching descendants. Status nodes are never hidden.
    pub(crate) fn hidden_by_filter(&self, node: &Node) -> bool {
        self.filter_mode == Some(FilterMode::Hide)
            && !node.is_status_node()
            && node.match_rank().is_none()
            && node.sub_match_count() == 0
    }

    /// True if the node would currently occupy a row: all ancestors
    /// expanded and not suppressed by an active hide-filter.
    pub fn is_row_visible(&self, id: NodeId) -> bool {
        let node = self.node_ref(id);
        if self.hidden_by_filter(node) {
            return false;
        }
        let mut p = node.parent_id();
        while let Some(pid) = p {
            let pn = self.node_ref(pid);
            if pn.parent_id().is_some() && !pn.expanded {
                return false;
            }
            p = pn.parent_id();
        }
        true
    }

    /// Collects the current row order as a list of node ids.
    pub fn row_order(&self) -> Vec<NodeId> {
        let mut rows = Vec::new();
        self.visit_rows(
            &mut |n: &Node| {
                rows.push(n.id());
                Visit::Continue
            },
            RowScan::default(),
        );
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wire::NodeData;
    use crate::tree::InsertMode;

    fn data(title: &str) -> NodeData {
        NodeData {
            title: title.to_string(),
            ..NodeData::default()
        }
    }

    /// root -> a(expanded: a1, a2(collapsed: a21)), b, c(expanded: c1)
    fn build() -> Tree {
        let mut tree = Tree::new();
        let root = tree.root_id();
        let a = tree.add_node(root, &data("a"), InsertMode::Child).unwrap();
        let _a1 = tree.add_node(a, &data("a1"), InsertMode::Child).unwrap();
        let a2 = tree.add_node(a, &data("a2"), InsertMode::Child).unwrap();
        let _a21 = tree.add_node(a2, &data("a21"), InsertMode::Child).unwrap();
        let _b = tree.add_node(root, &data("b"), InsertMode::Child).unwrap();
        let c = tree.add_node(root, &data("c"), InsertMode::Child).unwrap();
        let _c1 = tree.add_node(c, &data("c1"), InsertMode::Child).unwrap();
        tree.set_expanded(a, true).unwrap();
        tree.set_expanded(c, true).unwrap();
        tree
    }

    fn titles(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| tree.node(id).unwrap().title.clone())
            .collect()
    }

    #[test]
    fn test_visit_preorder_full() {
        let tree = build();
        let mut seen = Vec::new();
        tree.visit(&mut |n| {
            seen.push(n.title.clone());
            Visit::Continue
        });
        assert_eq!(seen, ["a", "a1", "a2", "a21", "b", "c", "c1"]);
    }

    #[test]
    fn test_visit_skip_prunes_children() {
        let tree = build();
        let mut seen = Vec::new();
        tree.visit(&mut |n| {
            seen.push(n.title.clone());
            if n.title == "a" {
                Visit::Skip
            } else {
                Visit::Continue
            }
        });
        assert_eq!(seen, ["a", "b", "c", "c1"]);
    }

    #[test]
    fn test_visit_stop_aborts() {
        let tree = build();
        let mut seen = Vec::new();
        let completed = tree.visit(&mut |n| {
            seen.push(n.title.clone());
            if n.title == "a2" {
                Visit::Stop
            } else {
                Visit::Continue
            }
        });
        assert!(!completed);
        assert_eq!(seen, ["a", "a1", "a2"]);
    }

    #[test]
    fn test_row_order_honors_expansion() {
        let tree = build();
        let rows = tree.row_order();
        // a2 is collapsed, so a21 must not appear.
        assert_eq!(titles(&tree, &rows), ["a", "a1", "a2", "b", "c", "c1"]);
    }

    #[test]
    fn test_row_order_include_hidden() {
        let tree = build();
        let mut rows = Vec::new();
        tree.visit_rows(
            &mut |n| {
                rows.push(n.id());
                Visit::Continue
            },
            RowScan {
                include_hidden: true,
                ..RowScan::default()
            },
        );
        assert_eq!(
            titles(&tree, &rows),
            ["a", "a1", "a2", "a21", "b", "c", "c1"]
        );
    }

    #[test]
    fn test_reverse_rows_mirror_forward() {
        let tree = build();
        let forward = tree.row_order();
        let last = *forward.last().unwrap();

        let mut reverse = Vec::new();
        tree.visit_rows(
            &mut |n| {
                reverse.push(n.id());
                Visit::Continue
            },
            RowScan {
                start: Some(last),
                reverse: true,
                ..RowScan::default()
            },
        );
        let mut mirrored = forward.clone();
        mirrored.reverse();
        assert_eq!(reverse, mirrored);
    }

    #[test]
    fn test_rows_from_start_without_self() {
        let tree = build();
        let rows = tree.row_order();
        let a2 = rows[2];
        let mut seen = Vec::new();
        tree.visit_rows(
            &mut |n| {
                seen.push(n.id());
                Visit::Continue
            },
            RowScan {
                start: Some(a2),
                include_self: false,
                ..RowScan::default()
            },
        );
        assert_eq!(titles(&tree, &seen), ["b", "c", "c1"]);
    }

    #[test]
    fn test_wrap_revisits_until_start() {
        let tree = build();
        let rows = tree.row_order();
        let b = rows[3];
        let mut seen = Vec::new();
        let completed = tree.visit_rows(
            &mut |n| {
                seen.push(n.id());
                Visit::Continue
            },
            RowScan {
                start: Some(b),
                include_self: false,
                wrap: true,
                ..RowScan::default()
            },
        );
        // Stops (returns false) when arriving back at the start node.
        assert!(!completed);
        assert_eq!(titles(&tree, &seen), ["c", "c1", "a", "a1", "a2"]);
    }

    #[test]
    fn test_is_row_visible() {
        let tree = build();
        let a21 = tree.find_first(tree.root_id(), |n| n.title == "a21").unwrap();
        let a1 = tree.find_first(tree.root_id(), |n| n.title == "a1").unwrap();
        assert!(!tree.is_row_visible(a21));
        assert!(tree.is_row_visible(a1));
    }
}
