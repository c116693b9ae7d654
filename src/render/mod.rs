//! Windowed rendering: viewport math, the row-diffing window pass, and
//! the update scheduler that coalesces change notifications into the
//! minimum necessary recomputation.

pub mod scheduler;
pub mod viewport;
pub mod windowing;

/// Opaque row identity issued by the row host when markup is created.
pub type RowHandle = u64;

pub use scheduler::ChangeType;
pub use viewport::{Viewport, RENDER_MAX_PREFETCH, ROW_HEIGHT};
pub use windowing::{ColumnSlot, RowHost, RowLayout};
