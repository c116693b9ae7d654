//! Wire format and lazy loading.
//!
//! `wire` defines the persisted/transferable node representation (the
//! payload format for both initial bulk loads and lazy-load responses);
//! `source` is the collaborator-facing child source contract; `loader`
//! coordinates asynchronous loads with request-id race protection.

pub mod loader;
pub mod source;
pub mod wire;

pub use source::{ChildSource, SourceReply};
pub use wire::{ColumnDef, NodeData, SourcePayload, TypeDef};
