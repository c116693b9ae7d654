//! Update scheduler.
//!
//! Every mutation declares a change class; classes accumulate in a
//! pending set until the host drains them with [`Tree::commit`]. The
//! drain runs exactly the necessary recomputation: column callback for
//! column classes, a full windowing pass for structural classes, a
//! per-node refresh for row/status classes, and a position-only pass
//! for pure scrolling. Changes noted *during* a drain are deferred to
//! the next drain, never re-entered.
//!
//! The host owns the clock: a deferred drain happens whenever the host
//! next calls `commit` (typically once per frame), and callers that
//! need the rendered state to be correct immediately call `commit`
//! themselves. [`Tree::run_without_update`] suspends draining for a
//! batch and leaves exactly one full pass behind.

use std::collections::HashSet;

use crate::event::TreeEvent;
use crate::render::viewport::Viewport;
use crate::render::windowing::RowHost;
use crate::tree::{NodeId, Tree};

/// Classes of pending work, from cheapest to most invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// Column structure or widths changed.
    Columns,
    /// A single row's content changed.
    Row,
    /// One node's status/data changed.
    Status,
    /// Tree structure changed (rows added/removed/reordered).
    Structure,
    /// Pure scroll: row positions only.
    Scroll,
    /// Unspecified; treated like `Structure`.
    Any,
}

/// Bound for the per-node refresh set; beyond it a drain degenerates
/// into one full windowing pass.
const MAX_CHANGED_NODES: usize = 200;

/// Pending-change accumulator.
pub struct UpdateScheduler {
    pending: HashSet<ChangeType>,
    changed_nodes: HashSet<NodeId>,
    deferred: HashSet<ChangeType>,
    deferred_nodes: HashSet<NodeId>,
    draining: bool,
    suspend_depth: u32,
}

impl UpdateScheduler {
    pub(crate) fn new() -> Self {
        UpdateScheduler {
            pending: HashSet::new(),
            changed_nodes: HashSet::new(),
            deferred: HashSet::new(),
            deferred_nodes: HashSet::new(),
            draining: false,
            suspend_depth: 0,
        }
    }

    /// Records one change class, optionally bound to a node.
    pub(crate) fn note(&mut self, change: ChangeType, node: Option<NodeId>) {
        let (pending, nodes) = if self.draining {
            (&mut self.deferred, &mut self.deferred_nodes)
        } else {
            (&mut self.pending, &mut self.changed_nodes)
        };
        if change == ChangeType::Structure {
            nodes.clear();
        }
        pending.insert(change);
        if let Some(id) = node {
            if !pending.contains(&ChangeType::Structure) {
                if nodes.len() < MAX_CHANGED_NODES {
                    nodes.insert(id);
                } else {
                    pending.insert(ChangeType::Structure);
                    nodes.clear();
                }
            }
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }
}

impl Tree {
    /// True when a commit would do any work.
    pub fn needs_commit(&self) -> bool {
        self.scheduler.has_pending() || !self.orphaned_rows.is_empty()
    }

    /// Drains all pending change classes into host work, immediately.
    ///
    /// No-op while updates are suspended or nothing is pending.
    /// Classes that accumulate while the drain runs are carried over
    /// to the next commit.
    pub fn commit(&mut self, viewport: &Viewport, host: &mut dyn RowHost) {
        if self.scheduler.is_suspended() || !self.needs_commit() {
            return;
        }
        self.scheduler.draining = true;
        let pending = std::mem::take(&mut self.scheduler.pending);
        let changed = std::mem::take(&mut self.scheduler.changed_nodes);

        if pending.contains(&ChangeType::Columns) {
            host.update_columns(&self.columns);
        }
        let structural =
            pending.contains(&ChangeType::Structure) || pending.contains(&ChangeType::Any);
        if structural || !self.orphaned_rows.is_empty() {
            self.render_window(viewport, host, true);
        } else {
            if pending.contains(&ChangeType::Row) || pending.contains(&ChangeType::Status) {
                let mut ids: Vec<NodeId> = changed.into_iter().collect();
                ids.sort_unstable();
                for id in ids {
                    let Some(node) = self.node(id) else { continue };
                    let (Some(idx), Some(handle)) = (node.row_idx(), node.row_handle) else {
                        continue;
                    };
                    let layout = self.build_row_layout(idx, id);
                    host.update_row(self.node_ref(id), handle, &layout);
                }
            }
            if pending.contains(&ChangeType::Scroll) {
                self.render_window(viewport, host, false);
            }
        }

        self.scheduler.draining = false;
        let deferred = std::mem::take(&mut self.scheduler.deferred);
        let deferred_nodes = std::mem::take(&mut self.scheduler.deferred_nodes);
        self.scheduler.pending.extend(deferred);
        self.scheduler.changed_nodes.extend(deferred_nodes);
        self.emit(TreeEvent::UpdateComplete);
    }

    /// Notes a pure-scroll change (cheapest class).
    pub fn note_scroll(&mut self) {
        self.scheduler.note(ChangeType::Scroll, None);
    }

    /// Runs a batch with rendering suspended; on release of the
    /// outermost scope, exactly one full pass is left pending (drained
    /// by the next `commit`).
    pub fn run_without_update<R>(&mut self, f: impl FnOnce(&mut Tree) -> R) -> R {
        self.scheduler.suspend_depth += 1;
        let result = f(self);
        self.scheduler.suspend_depth -= 1;
        if self.scheduler.suspend_depth == 0 {
            self.scheduler.note(ChangeType::Structure, None);
        }
        result
    }
}
