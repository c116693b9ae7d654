//! Command dispatch.
//!
//! A small closed vocabulary of navigation/modification verbs, each
//! mapping onto exactly one core operation. This is the seam keyboard,
//! menu, and drag-and-drop collaborators use instead of calling
//! internals directly.

use crate::error::TreeError;
use crate::tree::{InsertMode, NodeId, Tree};

/// Directional navigation targets, resolved in visible row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    /// Previous visible row.
    Up,
    /// Next visible row.
    Down,
    /// First visible row.
    First,
    /// Last visible row.
    Last,
    /// The parent node.
    Parent,
    /// Alias for `Parent` (collapse handling is the key layer's job).
    Left,
    /// First visible child of an expanded node.
    Right,
}

/// Command verbs accepted by [`Tree::apply_command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Swap with the previous sibling.
    MoveUp,
    /// Swap with the next sibling.
    MoveDown,
    /// Become the last child of the previous sibling.
    Indent,
    /// Become the following sibling of the current parent.
    Outdent,
    /// Remove the node; the previous sibling (or parent) becomes
    /// active.
    Remove,
    /// Change the node title.
    Rename(String),
    /// Move the active node.
    Navigate(NavDirection),
}

impl Tree {
    /// Resolves the node related to `id` in the given direction, in
    /// visible row order.
    pub fn find_related(&self, id: NodeId, direction: NavDirection) -> Option<NodeId> {
        use crate::domain::traversal::{RowScan, Visit};
        match direction {
            NavDirection::Up | NavDirection::Down => {
                let mut found = None;
                self.visit_rows(
                    &mut |n| {
                        found = Some(n.id());
                        Visit::Stop
                    },
                    RowScan {
                        start: Some(id),
                        reverse: direction == NavDirection::Up,
                        include_self: false,
                        ..RowScan::default()
                    },
                );
                found
            }
            NavDirection::First => self.row_order().first().copied(),
            NavDirection::Last => self.row_order().last().copied(),
            NavDirection::Parent | NavDirection::Left => self.get_parent(id),
            NavDirection::Right => {
                let node = self.node(id)?;
                if node.expanded {
                    self.get_first_child(id)
                } else {
                    None
                }
            }
        }
    }

    /// Executes one command verb against a node.
    ///
    /// Commands that cannot apply (moving the first sibling up,
    /// navigating past the last row) are silent no-ops, matching the
    /// keyboard-driven call sites.
    pub fn apply_command(&mut self, cmd: Command, id: NodeId) -> Result<(), TreeError> {
        if self.node(id).is_none() {
            return Err(TreeError::UnknownNode(id));
        }
        match cmd {
            Command::MoveUp => {
                if let Some(prev) = self.get_prev_sibling(id) {
                    self.move_to(id, prev, InsertMode::Before)?;
                    self.set_active(id)?;
                }
            }
            Command::MoveDown => {
                if let Some(next) = self.get_next_sibling(id) {
                    self.move_to(id, next, InsertMode::After)?;
                    self.set_active(id)?;
                }
            }
            Command::Indent => {
                if let Some(prev) = self.get_prev_sibling(id) {
                    self.move_to(id, prev, InsertMode::Child)?;
                    self.set_expanded(prev, true)?;
                    self.set_active(id)?;
                }
            }
            Command::Outdent => {
                if let Some(parent) = self.get_parent(id) {
                    self.move_to(id, parent, InsertMode::After)?;
                    self.set_active(id)?;
                }
            }
            Command::Remove => {
                let fallback = self.get_prev_sibling(id).or_else(|| self.get_parent(id));
                self.remove(id)?;
                if let Some(next_active) = fallback {
                    self.set_active(next_active)?;
                }
            }
            Command::Rename(title) => {
                self.set_title(id, &title)?;
            }
            Command::Navigate(direction) => match self.find_related(id, direction) {
                Some(target) => self.set_active(target)?,
                None => {
                    tracing::warn!(node = id, ?direction, "no related node in this direction");
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wire::NodeData;

    fn data(title: &str) -> NodeData {
        NodeData {
            title: title.to_string(),
            ..NodeData::default()
        }
    }

    fn two_siblings() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root_id();
        let a = tree.add_node(root, &data("a"), InsertMode::Child).unwrap();
        let b = tree.add_node(root, &data("b"), InsertMode::Child).unwrap();
        (tree, a, b)
    }

    #[test]
    fn test_move_down_swaps_siblings() {
        let (mut tree, a, b) = two_siblings();
        tree.apply_command(Command::MoveDown, a).unwrap();
        assert_eq!(tree.top_level_ids(), vec![b, a]);
        assert_eq!(tree.get_prev_sibling(a), Some(b));
        assert_eq!(tree.active_node(), Some(a));
    }

    #[test]
    fn test_move_up_is_noop_for_first() {
        let (mut tree, a, b) = two_siblings();
        tree.apply_command(Command::MoveUp, a).unwrap();
        assert_eq!(tree.top_level_ids(), vec![a, b]);
    }

    #[test]
    fn test_indent_outdent_round_trip() {
        let (mut tree, a, b) = two_siblings();
        tree.apply_command(Command::Indent, b).unwrap();
        assert_eq!(tree.get_parent(b), Some(a));
        assert!(tree.node(a).unwrap().expanded);

        tree.apply_command(Command::Outdent, b).unwrap();
        assert_eq!(tree.get_parent(b), None);
        assert_eq!(tree.top_level_ids(), vec![a, b]);
    }

    #[test]
    fn test_remove_activates_neighbor() {
        let (mut tree, a, b) = two_siblings();
        tree.apply_command(Command::Remove, b).unwrap();
        assert_eq!(tree.count(), 1);
        assert_eq!(tree.active_node(), Some(a));
    }

    #[test]
    fn test_rename() {
        let (mut tree, a, _) = two_siblings();
        tree.apply_command(Command::Rename("renamed".to_string()), a)
            .unwrap();
        assert_eq!(tree.node(a).unwrap().title, "renamed");
    }

    #[test]
    fn test_navigation_row_order() {
        let (mut tree, a, b) = two_siblings();
        let a1 = tree.add_node(a, &data("a1"), InsertMode::Child).unwrap();
        tree.set_expanded(a, true).unwrap();

        assert_eq!(tree.find_related(a, NavDirection::Down), Some(a1));
        assert_eq!(tree.find_related(a1, NavDirection::Down), Some(b));
        assert_eq!(tree.find_related(b, NavDirection::Up), Some(a1));
        assert_eq!(tree.find_related(a1, NavDirection::Parent), Some(a));
        assert_eq!(tree.find_related(a, NavDirection::Right), Some(a1));
        assert_eq!(tree.find_related(b, NavDirection::Right), None);
        assert_eq!(tree.find_related(b, NavDirection::First), Some(a));
        assert_eq!(tree.find_related(a, NavDirection::Last), Some(b));

        tree.apply_command(Command::Navigate(NavDirection::Down), a)
            .unwrap();
        assert_eq!(tree.active_node(), Some(a1));
    }
}
