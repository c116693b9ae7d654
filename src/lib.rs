//! Windowed tree-grid engine.
//!
//! A hierarchical list/tree-grid model designed to hold hundreds of
//! thousands of nodes while only materializing the rows that intersect
//! the visible viewport (plus a prefetch margin). The engine is
//! UI-agnostic: an embedding collaborator supplies a [`RowHost`] for
//! markup, a [`ChildSource`] for lazy children, and drives one
//! [`Tree::commit`] per frame; everything else (traversal, selection
//! propagation, filtering, windowing, update coalescing) lives here.

pub mod command;
pub mod domain;
pub mod error;
pub mod event;
pub mod io;
pub mod render;
pub mod tree;

// Export the data model
pub use tree::{InsertMode, Node, NodeId, StatusNodeType, Tree, TriState};

// Export traversal, selection, and filter engines
pub use domain::filter::{FilterMode, FilterOptions, FilterQuery, FilterVerdict};
pub use domain::selection::{SelectMode, SelectOptions};
pub use domain::traversal::{RowScan, Visit};

// Export the wire format and lazy loading
pub use io::loader::NodeStatus;
pub use io::source::{ChildSource, SourceReply};
pub use io::wire::{parse_payload, ColumnDef, NodeData, SourcePayload, TypeDef};

// Export the windowing renderer and scheduler
pub use render::scheduler::ChangeType;
pub use render::viewport::{Viewport, RENDER_MAX_PREFETCH, ROW_HEIGHT};
pub use render::windowing::{ColumnSlot, RowHost, RowLayout};
pub use render::RowHandle;

// Export commands, events, errors
pub use command::{Command, NavDirection};
pub use error::TreeError;
pub use event::{ChildModOp, EventSink, TreeEvent};
