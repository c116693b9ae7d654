//! Pure tree algorithms: traversal orders, selection propagation, and
//! the filter/match engine. All of them operate on the arena owned by
//! [`crate::Tree`] and run synchronously to completion once invoked, so
//! no other operation can interleave mid-traversal.

pub mod filter;
pub mod selection;
pub mod traversal;
