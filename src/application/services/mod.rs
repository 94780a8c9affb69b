//! Application services
//!
//! Concrete service implementations that drive the outliner engine.
//! Services depend on the boundary traits (DomainAdapter, SelectionProvider,
//! TransactionProvider) but are themselves concrete structs. The hierarchy
//! resolver is the one seam that is a trait, since the world and the
//! nested-scope projections share the engine.

mod changes;
mod drag_drop;
mod filters;
mod folders;
mod hierarchy;
mod nested_hierarchy;
mod outliner;
mod pinning;
mod selection;
mod transaction;
mod tree;

pub use changes::{ChangeTranslator, DeltaListener, HierarchyEvents};
pub use drag_drop::{DragDropService, DragPayload, DropCompatibility, DropReport, DropValidation};
pub use filters::{
    Filter, FilterContext, FilterDefault, FilterPredicate, FilterSet, TextFilter, HIDE_COMPONENTS,
    HIDE_NESTED_SCOPES, HIDE_TEMPORARY, HIDE_UNLOADED, LOCKED_INTERACTION, NESTED_SCOPE_INTERACTION,
    ONLY_SELECTED,
};
pub use folders::{FolderService, DEFAULT_FOLDER_NAME};
pub use hierarchy::{HierarchyResolver, ItemLookup, WorldHierarchy};
pub use nested_hierarchy::NestedScopeHierarchy;
pub use outliner::{Outliner, OutlinerMode};
pub use pinning::PinController;
pub use selection::{SelectionSynchronizer, TreeSelectionListener};
pub use transaction::ScopedTransaction;
pub use tree::{ApplyOutcome, OutlinerTree, ViewContext};
