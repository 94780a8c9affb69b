//! Tree items and tree deltas

use std::fmt;

use crate::domain::entities::{
    FolderPath, FolderRoot, ObjectGuid, ObjectHandle, ScopeId, SubObjectHandle,
};

/// Discriminant of a tree item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    Scope,
    Object,
    SubObject,
    Folder,
    Unloaded,
    NestedScopeRoot,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Scope => "scope",
            ItemKind::Object => "object",
            ItemKind::SubObject => "sub-object",
            ItemKind::Folder => "folder",
            ItemKind::Unloaded => "unloaded",
            ItemKind::NestedScopeRoot => "nested-scope",
        };
        f.write_str(name)
    }
}

/// Stable identity of a tree item.
///
/// The identifier *is* the weak reference into the domain: handles for
/// loaded entities, the persistent guid for unloaded descriptors, and
/// `(root, path)` for grouping folders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemId {
    Scope(ScopeId),
    Object(ObjectHandle),
    SubObject(SubObjectHandle),
    Folder(FolderRoot, FolderPath),
    Unloaded(ObjectGuid),
    NestedScopeRoot(ObjectHandle),
}

impl ItemId {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemId::Scope(_) => ItemKind::Scope,
            ItemId::Object(_) => ItemKind::Object,
            ItemId::SubObject(_) => ItemKind::SubObject,
            ItemId::Folder(..) => ItemKind::Folder,
            ItemId::Unloaded(_) => ItemKind::Unloaded,
            ItemId::NestedScopeRoot(_) => ItemKind::NestedScopeRoot,
        }
    }

    pub fn folder(root: FolderRoot, path: impl Into<FolderPath>) -> Self {
        ItemId::Folder(root, path.into())
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            ItemId::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<(FolderRoot, &FolderPath)> {
        match self {
            ItemId::Folder(root, path) => Some((*root, path)),
            _ => None,
        }
    }

    /// Items that are the top of a materialized tree and never have a parent.
    pub fn is_root_kind(&self) -> bool {
        matches!(self, ItemId::Scope(_) | ItemId::NestedScopeRoot(_))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Scope(id) => write!(f, "{}", id),
            ItemId::Object(handle) => write!(f, "{}", handle),
            ItemId::SubObject(handle) => write!(f, "{}", handle),
            ItemId::Folder(FolderRoot::Scope, path) => write!(f, "folder:{}", path),
            ItemId::Folder(root, path) => write!(f, "folder:{}@{}", path, root),
            ItemId::Unloaded(guid) => write!(f, "unloaded:{}", guid),
            ItemId::NestedScopeRoot(handle) => write!(f, "nested:{}", handle),
        }
    }
}

/// The unit of display.
///
/// Items are projections: they hold no domain data besides the cached label
/// and must be re-validated against the domain before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub id: ItemId,
    /// Cached display string.
    pub label: String,
    /// Visible items may still be excluded from selection and dragging.
    pub can_interact: bool,
    /// Whether the view can show and toggle visibility for this item.
    pub has_visibility_info: bool,
}

impl TreeItem {
    pub fn new(id: ItemId, label: impl Into<String>) -> Self {
        let has_visibility_info = matches!(
            id.kind(),
            ItemKind::Object | ItemKind::SubObject | ItemKind::Folder | ItemKind::NestedScopeRoot
        );
        Self {
            id,
            label: label.into(),
            can_interact: true,
            has_visibility_info,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.id.kind()
    }

    pub fn can_interact(&self) -> bool {
        self.can_interact
    }

    pub fn display_string(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for TreeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Normalized incremental change record, consumed once by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDelta {
    Added(TreeItem),
    Removed(ItemId),
    Moved(TreeItem),
    ContainerMoved {
        root: FolderRoot,
        old_path: FolderPath,
        new_path: FolderPath,
    },
    FullRefresh,
}

impl TreeDelta {
    /// Identifier of the item this delta is about, if any.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            TreeDelta::Added(item) | TreeDelta::Moved(item) => Some(item.id.clone()),
            TreeDelta::Removed(id) => Some(id.clone()),
            TreeDelta::ContainerMoved { root, old_path, .. } => {
                Some(ItemId::Folder(*root, old_path.clone()))
            }
            TreeDelta::FullRefresh => None,
        }
    }

    pub fn is_full_refresh(&self) -> bool {
        matches!(self, TreeDelta::FullRefresh)
    }
}
