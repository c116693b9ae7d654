//! Viewport windowing renderer.
//!
//! One pass over the tree in row order: every enumerated node gets its
//! row index assigned; nodes inside the window get a row representation
//! created or updated in place (identity is kept unless the host's
//! handle says otherwise), nodes outside get theirs discarded. The set
//! of enumerated nodes is diffed against the previous pass so rows
//! whose nodes vanished (collapsed, filtered out, removed) are released
//! and reported with a `discard` notification.
//!
//! The pass is idempotent: re-running it with unchanged scroll/size/
//! tree state performs zero creates and discards. A scroll-only pass
//! (`refresh = false`) leaves representations of unmoved rows untouched
//! and only materializes rows entering the window.

use std::collections::HashSet;

use crate::domain::traversal::{RowScan, Visit};
use crate::event::TreeEvent;
use crate::io::wire::ColumnDef;
use crate::render::viewport::{Viewport, ROW_HEIGHT};
use crate::render::RowHandle;
use crate::tree::{Node, NodeId, StatusNodeType, Tree, TriState};

/// One pre-filled cell for the row host.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSlot {
    pub id: String,
    /// Default text content (title for the main column, the matching
    /// data field otherwise); the host may replace it with arbitrary
    /// rich content but must not change row height or count.
    pub text: String,
}

/// Render-relevant state of one row, passed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    pub row_idx: usize,
    pub top_px: f64,
    /// Depth in the tree (top-level rows have depth 1).
    pub depth: usize,
    pub expanded: bool,
    /// `None` for lazy nodes whose children are still unknown.
    pub has_children: Option<bool>,
    pub selection: TriState,
    pub status: Option<StatusNodeType>,
    pub loading: bool,
    pub active: bool,
    /// True when a dim-filter is active and this row is unmatched.
    pub dimmed: bool,
    /// Matched title byte ranges of the active filter.
    pub match_spans: Vec<(usize, usize)>,
    pub columns: Vec<ColumnSlot>,
}

/// Markup-side collaborator: creates, refreshes, and discards row
/// representations on behalf of the windowing pass.
pub trait RowHost {
    /// Creates markup for a row entering the window.
    fn create_row(&mut self, node: &Node, layout: &RowLayout) -> RowHandle;

    /// Refreshes an existing row in place (position and/or content).
    fn update_row(&mut self, node: &Node, handle: RowHandle, layout: &RowLayout);

    /// Releases the representation of a row that left the window or
    /// whose node is gone.
    fn discard_row(&mut self, node: NodeId, handle: RowHandle);

    /// Reports `row_count * ROW_HEIGHT` after a pass, so scrollbar
    /// proportions stay correct.
    fn set_content_height(&mut self, px: f64);

    /// Column set changed (structure or widths).
    fn update_columns(&mut self, _columns: &[ColumnDef]) {}
}

impl Tree {
    /// Runs one windowing pass against the host.
    ///
    /// # Arguments
    /// * `viewport` - current scroll offset and container height
    /// * `host` - markup collaborator
    /// * `refresh` - when false (scroll-only fast path), rows whose
    ///   index did not change are not re-rendered; only rows entering
    ///   the window are materialized
    pub fn render_window(&mut self, viewport: &Viewport, host: &mut dyn RowHost, refresh: bool) {
        let (start, end) = viewport.row_window();

        // Rows whose nodes were removed since the last pass.
        for (id, handle) in std::mem::take(&mut self.orphaned_rows) {
            host.discard_row(id, handle);
            self.emit(TreeEvent::Discard { node: id });
        }

        let mut order = Vec::new();
        self.visit_rows(
            &mut |n: &Node| {
                order.push(n.id());
                Visit::Continue
            },
            RowScan::default(),
        );

        let mut obsolete: HashSet<NodeId> = std::mem::take(&mut self.view_nodes);
        for (idx, &id) in order.iter().enumerate() {
            obsolete.remove(&id);
            self.view_nodes.insert(id);

            let prev_idx = self.node_ref(id).row_idx();
            if prev_idx != Some(idx) {
                self.node_mut(id).row_idx = Some(idx);
            }

            if idx < start || idx > end {
                if let Some(handle) = self.node_mut(id).row_handle.take() {
                    host.discard_row(id, handle);
                    self.emit(TreeEvent::Discard { node: id });
                }
            } else {
                let layout = self.build_row_layout(idx, id);
                match self.node_ref(id).row_handle {
                    Some(handle) => {
                        if refresh || prev_idx != Some(idx) {
                            host.update_row(self.node_ref(id), handle, &layout);
                        }
                    }
                    None => {
                        let handle = host.create_row(self.node_ref(id), &layout);
                        self.node_mut(id).row_handle = Some(handle);
                    }
                }
            }
        }

        // Previously enumerated nodes that no longer are (collapsed or
        // filtered out, but still in the tree).
        for id in obsolete {
            if self.node(id).is_some() {
                self.node_mut(id).row_idx = None;
                if let Some(handle) = self.node_mut(id).row_handle.take() {
                    host.discard_row(id, handle);
                    self.emit(TreeEvent::Discard { node: id });
                }
            }
        }

        host.set_content_height(order.len() as f64 * ROW_HEIGHT);
        tracing::debug!(
            rows = order.len(),
            start,
            end,
            refresh,
            "windowing pass complete"
        );
    }

    /// Assembles the host-facing state snapshot for one row.
    pub fn build_row_layout(&self, row_idx: usize, id: NodeId) -> RowLayout {
        let node = self.node_ref(id);
        let dimmed = self.filter_mode == Some(crate::domain::filter::FilterMode::Dim)
            && !node.is_status_node()
            && node.match_rank().is_none()
            && node.sub_match_count() == 0;
        let columns = if self.columns.is_empty() {
            vec![ColumnSlot {
                id: "*".to_string(),
                text: node.title.clone(),
            }]
        } else {
            self.columns
                .iter()
                .map(|col| ColumnSlot {
                    id: col.id.clone(),
                    text: if col.id == "*" {
                        node.title.clone()
                    } else {
                        match node.data.get(&col.id) {
                            Some(serde_json::Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => String::new(),
                        }
                    },
                })
                .collect()
        };
        RowLayout {
            row_idx,
            top_px: row_idx as f64 * ROW_HEIGHT,
            depth: self.get_level(id),
            expanded: node.expanded,
            has_children: node.has_children(),
            selection: node.selection_state(),
            status: node.status_node_type(),
            loading: node.is_loading(),
            active: self.active_node() == Some(id),
            dimmed,
            match_spans: node.match_spans().to_vec(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wire::NodeData;
    use crate::tree::InsertMode;

    /// Counting host: records create/update/discard calls.
    #[derive(Default)]
    struct MockHost {
        next_handle: RowHandle,
        created: Vec<NodeId>,
        updated: Vec<NodeId>,
        discarded: Vec<NodeId>,
        content_height: f64,
        live: HashSet<RowHandle>,
    }

    impl RowHost for MockHost {
        fn create_row(&mut self, node: &Node, _layout: &RowLayout) -> RowHandle {
            self.next_handle += 1;
            self.created.push(node.id());
            self.live.insert(self.next_handle);
            self.next_handle
        }
        fn update_row(&mut self, node: &Node, handle: RowHandle, _layout: &RowLayout) {
            assert!(self.live.contains(&handle), "update of unknown handle");
            self.updated.push(node.id());
        }
        fn discard_row(&mut self, node: NodeId, handle: RowHandle) {
            assert!(self.live.remove(&handle), "double discard");
            self.discarded.push(node);
        }
        fn set_content_height(&mut self, px: f64) {
            self.content_height = px;
        }
    }

    impl MockHost {
        fn reset_counts(&mut self) {
            self.created.clear();
            self.updated.clear();
            self.discarded.clear();
        }
    }

    fn data(title: &str) -> NodeData {
        NodeData {
            title: title.to_string(),
            ..NodeData::default()
        }
    }

    fn wide_tree(n: usize) -> Tree {
        let mut tree = Tree::new();
        let root = tree.root_id();
        for i in 0..n {
            tree.add_node(root, &data(&format!("n{i}")), InsertMode::Child)
                .unwrap();
        }
        tree
    }

    #[test]
    fn test_only_windowed_rows_materialize() {
        let mut tree = wide_tree(100);
        let mut host = MockHost::default();
        let vp = Viewport::new(0.0, 220.0); // rows 0..=15
        tree.render_window(&vp, &mut host, true);
        assert_eq!(host.created.len(), 16);
        assert_eq!(host.content_height, 100.0 * ROW_HEIGHT);
    }

    #[test]
    fn test_windowing_idempotent() {
        let mut tree = wide_tree(100);
        let mut host = MockHost::default();
        let vp = Viewport::new(0.0, 220.0);
        tree.render_window(&vp, &mut host, true);
        host.reset_counts();

        tree.render_window(&vp, &mut host, true);
        assert!(host.created.is_empty(), "second pass created rows");
        assert!(host.discarded.is_empty(), "second pass discarded rows");
    }

    #[test]
    fn test_scroll_moves_window() {
        let mut tree = wide_tree(100);
        let mut host = MockHost::default();
        tree.render_window(&Viewport::new(0.0, 220.0), &mut host, true);
        host.reset_counts();

        // Scroll far down: the whole window shifts.
        tree.render_window(&Viewport::new(1320.0, 220.0), &mut host, false);
        // Old rows 0..=15 out, new rows 54..=75 in.
        assert_eq!(host.discarded.len(), 16);
        assert_eq!(host.created.len(), 22);
        // Scroll-only: surviving rows did not move, nothing updated.
        assert!(host.updated.is_empty());
    }

    #[test]
    fn test_scroll_only_skips_unmoved_rows() {
        let mut tree = wide_tree(100);
        let mut host = MockHost::default();
        tree.render_window(&Viewport::new(0.0, 220.0), &mut host, true);
        host.reset_counts();

        // One row further down; window grows by a couple of rows but
        // existing rows keep their indices.
        tree.render_window(&Viewport::new(22.0, 220.0), &mut host, false);
        assert!(host.updated.is_empty());
        assert!(host.discarded.is_empty());
        assert_eq!(host.created.len(), 1, "row 16 enters the window");
    }

    #[test]
    fn test_collapse_discards_hidden_rows() {
        let mut tree = Tree::new();
        let root = tree.root_id();
        let p = tree.add_node(root, &data("p"), InsertMode::Child).unwrap();
        for i in 0..3 {
            tree.add_node(p, &data(&format!("c{i}")), InsertMode::Child)
                .unwrap();
        }
        tree.set_expanded(p, true).unwrap();

        let mut host = MockHost::default();
        let vp = Viewport::new(0.0, 220.0);
        tree.render_window(&vp, &mut host, true);
        assert_eq!(host.created.len(), 4);
        host.reset_counts();

        tree.set_expanded(p, false).unwrap();
        tree.render_window(&vp, &mut host, true);
        assert_eq!(host.discarded.len(), 3, "children released on collapse");
        assert_eq!(host.content_height, ROW_HEIGHT);
    }

    #[test]
    fn test_removed_node_row_released() {
        let mut tree = wide_tree(3);
        let mut host = MockHost::default();
        let vp = Viewport::new(0.0, 220.0);
        tree.render_window(&vp, &mut host, true);
        host.reset_counts();

        let first = tree.top_level_ids()[0];
        tree.remove(first).unwrap();
        tree.render_window(&vp, &mut host, true);
        assert!(host.discarded.contains(&first));
    }

    #[test]
    fn test_row_layout_contents() {
        let mut tree = Tree::new();
        let root = tree.root_id();
        tree.set_columns(vec![
            ColumnDef {
                id: "*".to_string(),
                title: "Name".to_string(),
                width: None,
            },
            ColumnDef {
                id: "size".to_string(),
                title: "Size".to_string(),
                width: None,
            },
        ]);
        let mut d = data("file.txt");
        d.data
            .insert("size".to_string(), serde_json::json!("4 kB"));
        let id = tree.add_node(root, &d, InsertMode::Child).unwrap();

        let layout = tree.build_row_layout(0, id);
        assert_eq!(layout.depth, 1);
        assert_eq!(layout.columns.len(), 2);
        assert_eq!(layout.columns[0].text, "file.txt");
        assert_eq!(layout.columns[1].text, "4 kB");
        assert_eq!(layout.top_px, 0.0);
    }
}
