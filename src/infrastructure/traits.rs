//! Boundary traits for the external collaborators
//!
//! The engine only ever talks to the domain, the selection and the undo
//! system through these traits, so it can be driven by the in-memory
//! implementations in tests and by a real editor in production.

use std::fmt;
use std::sync::Arc;

use crate::domain::{
    DomainEvent, DomainResult, FolderPath, FolderRoot, ItemId, ObjectGuid, ObjectHandle,
    ObjectInfo, ScopeInfo, SubObjectHandle, SubObjectInfo, UnloadedDescriptor,
};

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type DomainListener = Arc<dyn Fn(&DomainEvent) + Send + Sync>;
pub type SelectionListener = Arc<dyn Fn() + Send + Sync>;

/// Read and mutation surface of the projected domain.
///
/// Every query takes weak handles and returns `None`/empty for expired ones;
/// the engine treats that as "this branch no longer exists".
pub trait DomainAdapter: Send + Sync {
    /// The represented scope, or `None` when nothing is loaded.
    fn scope(&self) -> Option<ScopeInfo>;

    /// All loaded objects, including those inside nested scopes.
    fn objects(&self) -> Vec<ObjectHandle>;

    fn object(&self, handle: ObjectHandle) -> Option<ObjectInfo>;

    fn sub_objects(&self, owner: ObjectHandle) -> Vec<SubObjectHandle>;

    fn sub_object(&self, handle: SubObjectHandle) -> Option<SubObjectInfo>;

    /// Registered folders of one container.
    fn folders(&self, root: FolderRoot) -> Vec<FolderPath>;

    fn folder_exists(&self, root: FolderRoot, path: &FolderPath) -> bool;

    /// Objects known to the persisted index but not loaded.
    fn unloaded(&self) -> Vec<UnloadedDescriptor>;

    fn unloaded_descriptor(&self, guid: ObjectGuid) -> Option<UnloadedDescriptor>;

    /// Named attachment points offered by a prospective parent.
    fn attachment_sockets(&self, parent: ObjectHandle) -> Vec<String>;

    /// Domain-specific attachment precondition; `Err` carries the reason.
    fn can_attach(&self, parent: ObjectHandle, child: ObjectHandle) -> Result<(), String>;

    /// Whether an object may move into another container.
    fn can_move_to_container(&self, object: ObjectHandle, root: FolderRoot) -> Result<(), String>;

    fn attach(&self, parent: ObjectHandle, child: ObjectHandle, socket: Option<&str>) -> DomainResult<()>;

    fn detach(&self, child: ObjectHandle) -> DomainResult<()>;

    /// Set an object's folder, creating the folder (and its ancestors) if needed.
    fn set_folder_path(&self, object: ObjectHandle, path: &FolderPath) -> DomainResult<()>;

    /// Move objects into another container, keeping their folder path.
    fn move_to_container(&self, objects: &[ObjectHandle], root: FolderRoot) -> DomainResult<()>;

    /// Register a folder and any missing ancestors.
    fn create_folder(&self, root: FolderRoot, path: &FolderPath) -> DomainResult<()>;

    /// Rename one folder entry; objects directly inside it follow.
    /// Sub-folders are not touched.
    fn rename_folder(&self, root: FolderRoot, old_path: &FolderPath, new_path: &FolderPath) -> DomainResult<()>;

    fn delete_folder(&self, root: FolderRoot, path: &FolderPath) -> DomainResult<()>;

    fn pin(&self, guid: ObjectGuid);

    fn unpin(&self, guid: ObjectGuid);

    fn is_pinned(&self, guid: ObjectGuid) -> bool;

    fn subscribe(&self, listener: DomainListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Whether the entity behind an item identifier still exists.
    fn contains_item(&self, id: &ItemId) -> bool {
        match id {
            ItemId::Scope(scope_id) => self.scope().map(|s| s.id == *scope_id).unwrap_or(false),
            ItemId::Object(handle) => self.object(*handle).is_some(),
            ItemId::NestedScopeRoot(handle) => self
                .object(*handle)
                .map(|info| info.is_nested_scope)
                .unwrap_or(false),
            ItemId::SubObject(handle) => self.sub_object(*handle).is_some(),
            ItemId::Folder(root, path) => {
                let root_valid = match root {
                    FolderRoot::Scope => self.scope().is_some(),
                    FolderRoot::Object(owner) => self.object(*owner).is_some(),
                };
                root_valid && self.folder_exists(*root, path)
            }
            ItemId::Unloaded(guid) => self.unloaded_descriptor(*guid).is_some(),
        }
    }
}

/// Domain-side selection of objects.
///
/// Changes made between `begin_batch` and `end_batch` produce at most one
/// notification, raised by `end_batch(true)`.
pub trait SelectionProvider: Send + Sync {
    fn selected(&self) -> Vec<ObjectHandle>;

    fn is_selected(&self, handle: ObjectHandle) -> bool;

    fn begin_batch(&self);

    fn select(&self, handle: ObjectHandle, selected: bool);

    fn clear(&self);

    fn end_batch(&self, notify: bool);

    fn subscribe(&self, listener: SelectionListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Undo boundary. Nested begin/end pairs merge into the outermost one.
pub trait TransactionProvider: Send + Sync {
    fn begin(&self, description: &str);

    fn end(&self);
}

/// Answer of a socket chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketChoice {
    Socket(String),
    Default,
    Cancelled,
}

/// Sub-dialog asked to pick an attachment socket when a parent offers several.
pub trait SocketChooser {
    fn choose_socket(&self, parent: &ObjectInfo, sockets: &[String]) -> SocketChoice;
}
