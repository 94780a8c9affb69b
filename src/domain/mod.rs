//! Domain layer: identifiers, weak handles, tree items and deltas
//!
//! This layer is independent of external concerns (no I/O, no trait objects
//! into the outside world). Everything here is a value type.

pub mod arena;
pub mod entities;
pub mod error;
pub mod item;

pub use arena::{ItemArena, PostOrderIterator, TreeIterator, TreeNode};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use item::{ItemId, ItemKind, TreeDelta, TreeItem};
