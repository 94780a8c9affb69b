//! Domain entities: handles, folder paths and the records the domain reports

use std::fmt;

use generational_arena::Index;
use itertools::Itertools;
use uuid::Uuid;

/// Weak, generation-checked handle to a loaded domain object.
///
/// The handle never owns the object. A handle whose slot was reused by a
/// later object carries a different generation, so dereferencing a destroyed
/// object is always detectable through the domain adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(Index);

impl ObjectHandle {
    pub fn from_index(index: Index) -> Self {
        Self(index)
    }

    pub fn index(&self) -> Index {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "obj#{}.{}", slot, generation)
    }
}

/// Weak handle to a sub-object owned 1:1 by an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubObjectHandle(Index);

impl SubObjectHandle {
    pub fn from_index(index: Index) -> Self {
        Self(index)
    }

    pub fn index(&self) -> Index {
        self.0
    }
}

impl fmt::Display for SubObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "sub#{}.{}", slot, generation)
    }
}

/// Persistent identity of an object, stable across load/unload.
/// Used for pinning and for unloaded descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectGuid(Uuid);

impl ObjectGuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a represented domain instance (a loaded world).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.0)
    }
}

/// Hierarchical grouping-folder key, `/`-separated.
///
/// The empty path means "no folder" (the root of its container).
/// Construction normalizes redundant separators: `"/A//B/"` becomes `"A/B"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FolderPath(String);

impl FolderPath {
    pub const SEPARATOR: char = '/';

    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path
            .as_ref()
            .split(Self::SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .join("/");
        Self(normalized)
    }

    /// The root-level "no folder" path.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (`"A/B"` → `"B"`).
    pub fn leaf(&self) -> &str {
        self.0
            .rsplit_once(Self::SEPARATOR)
            .map(|(_, leaf)| leaf)
            .unwrap_or(&self.0)
    }

    /// Path minus the last segment; `none()` for single-segment paths.
    pub fn parent(&self) -> FolderPath {
        match self.0.rsplit_once(Self::SEPARATOR) {
            Some((parent, _)) => Self(parent.to_string()),
            None => Self::none(),
        }
    }

    pub fn join(&self, leaf: &str) -> FolderPath {
        if self.is_none() {
            Self::new(leaf)
        } else {
            Self::new(format!("{}/{}", self.0, leaf))
        }
    }

    pub fn depth(&self) -> usize {
        if self.is_none() {
            0
        } else {
            self.0.split(Self::SEPARATOR).count()
        }
    }

    /// True if `self` lies strictly below `ancestor`. Every non-empty path is a
    /// descendant of `none()`.
    pub fn is_descendant_of(&self, ancestor: &FolderPath) -> bool {
        if ancestor.is_none() {
            return !self.is_none();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0[ancestor.0.len()..].starts_with(Self::SEPARATOR)
    }

    pub fn is_same_or_descendant_of(&self, ancestor: &FolderPath) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Replace the `old_prefix` portion of this path with `new_prefix`.
    /// Returns `None` when the path is not under `old_prefix`.
    pub fn rebase(&self, old_prefix: &FolderPath, new_prefix: &FolderPath) -> Option<FolderPath> {
        if self == old_prefix {
            return Some(new_prefix.clone());
        }
        if !self.is_descendant_of(old_prefix) {
            return None;
        }
        let rest = if old_prefix.is_none() {
            self.0.as_str()
        } else {
            &self.0[old_prefix.0.len() + 1..]
        };
        Some(new_prefix.join(rest))
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FolderPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The container a folder namespace belongs to: the scope itself, or a
/// nested-scope object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FolderRoot {
    Scope,
    Object(ObjectHandle),
}

impl fmt::Display for FolderRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderRoot::Scope => f.write_str("scope"),
            FolderRoot::Object(handle) => write!(f, "{}", handle),
        }
    }
}

/// The represented domain instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    pub id: ScopeId,
    pub label: String,
    /// Streamed/partitioned domains support pinning and unloaded descriptors.
    pub partitioned: bool,
}

/// Snapshot of one loaded object as reported by the domain adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub handle: ObjectHandle,
    pub guid: ObjectGuid,
    pub label: String,
    /// Explicit attachment parent.
    pub attach_parent: Option<ObjectHandle>,
    pub folder: FolderPath,
    /// Enclosing nested scope, if this object lives inside one.
    pub owner: Option<ObjectHandle>,
    /// True if this object is itself a nested scope.
    pub is_nested_scope: bool,
    /// Only meaningful for nested scopes: currently entered for editing.
    pub editing: bool,
    pub temporary: bool,
    pub locked: bool,
}

impl ObjectInfo {
    /// Folder namespace this object's folder path is interpreted in.
    pub fn folder_root(&self) -> FolderRoot {
        self.owner.map(FolderRoot::Object).unwrap_or(FolderRoot::Scope)
    }

    pub fn is_editing_nested_scope(&self) -> bool {
        self.is_nested_scope && self.editing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubObjectInfo {
    pub handle: SubObjectHandle,
    pub owner: ObjectHandle,
    pub label: String,
}

/// Placeholder for an object that exists in the persisted index but is not
/// loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadedDescriptor {
    pub guid: ObjectGuid,
    pub label: String,
    pub folder: FolderPath,
}

/// Mutation notifications raised by the domain, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    ObjectAdded(ObjectHandle),
    ObjectRemoved(ObjectHandle),
    ObjectAttached {
        child: ObjectHandle,
        parent: ObjectHandle,
    },
    ObjectDetached {
        child: ObjectHandle,
        old_parent: ObjectHandle,
    },
    ObjectFolderChanged {
        object: ObjectHandle,
        old_path: FolderPath,
    },
    /// Object moved between the scope and a nested scope.
    ObjectContainerChanged(ObjectHandle),
    FolderCreated {
        root: FolderRoot,
        path: FolderPath,
    },
    FolderMoved {
        root: FolderRoot,
        old_path: FolderPath,
        new_path: FolderPath,
    },
    FolderDeleted {
        root: FolderRoot,
        path: FolderPath,
    },
    DescriptorAdded(ObjectGuid),
    DescriptorRemoved(ObjectGuid),
    NestedScopeEditChanged(ObjectHandle),
    SubObjectsChanged(ObjectHandle),
    ScopeLoaded,
    ScopeUnloaded,
    BulkListChanged,
}
